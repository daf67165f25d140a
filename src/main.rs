#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let summary = territory_map::run().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
