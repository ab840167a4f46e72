fn main() -> anyhow::Result<()> {
    pokedeck::cli::run()
}
