use std::env;

use anyhow::Result;
use reqstore_azure_storage::{BlobProperties, BlobService, Config, QueueService, Service};
use reqstore_core::Context;
use reqstore_http_send_reqwest::ReqwestHttpSend;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // Development storage unless a real account is configured.
    let conn_str = env::var("AZURE_STORAGE_CONNECTION_STRING")
        .unwrap_or_else(|_| "UseDevelopmentStorage=true".to_string());

    let ctx = Context::new().with_http_send(ReqwestHttpSend::default());

    let blobs = BlobService::new(
        ctx.clone(),
        &Config::from_connection_string(&conn_str, Service::Blob)?,
    )?;
    let container = blobs.container("reqstore-demo");

    let created = container.create_if_not_exists().await;
    if !created.is_success() {
        println!("failed to create container: {}", created.error_message());
        return Ok(());
    }
    println!("container created: {:?}", created.payload());

    let blob = container.blob("hello.txt");
    let content = b"Hello from reqstore";
    let props = BlobProperties::default()
        .with_content_type("text/plain")
        .with_metadata("source", "example");
    blob.upload(content.as_slice(), content.len() as u64, props)
        .await
        .into_result()?;

    let body = blob.download().await.into_result()?;
    println!("downloaded: {}", String::from_utf8_lossy(&body));

    let list = container.list_blobs(None, None).await.into_result()?;
    for item in &list.blobs {
        println!("  {} ({} bytes)", item.name, item.content_length);
    }

    blob.delete().await.into_result()?;
    container.delete().await.into_result()?;

    let queues = QueueService::new(
        ctx,
        &Config::from_connection_string(&conn_str, Service::Queue)?,
    )?;
    let queue = queues.queue("reqstore-demo");
    queue.create_if_not_exists().await.into_result()?;
    queue.put_message("hello").await.into_result()?;
    queue.delete().await.into_result()?;

    Ok(())
}
