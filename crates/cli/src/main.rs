use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tagtidy_cli::main_entry().await
}
