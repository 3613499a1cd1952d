use anyhow::Result;

fn main() -> Result<()> {
    lookup_race::cli::run()
}
