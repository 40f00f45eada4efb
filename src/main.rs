fn main() -> anyhow::Result<()> {
    modchain::run()
}
