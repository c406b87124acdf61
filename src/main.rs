#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    drone_inspection_server::run().await?;
    Ok(())
}
