#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hygge_study_lib::run().await
}
