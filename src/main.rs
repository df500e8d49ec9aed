#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = campus_marks::run().await {
        eprintln!("campus-marks fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
