#[actix_web::main]
async fn main() -> eyre::Result<()> {
    herald::run().start().await
}
