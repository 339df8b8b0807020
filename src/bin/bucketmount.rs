use anyhow::Result;

fn main() -> Result<()> {
    bucketmount::cli::run()
}
