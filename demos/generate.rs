//! Generate a single image and save it to disk.
//!
//! Tracks the task over the personal-event stream and prints every
//! status update as it arrives.
//!
//! ```sh
//! PIXAI_API_KEY=... cargo run --example generate
//! ```

use pixai_rs::{PixaiClient, TaskMedia, TaskParameters};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let api_key = std::env::var("PIXAI_API_KEY").expect("set PIXAI_API_KEY");
    let client = PixaiClient::new(api_key);

    println!("generating image...");
    let task = client
        .generate_image_with_updates(
            &TaskParameters::new()
                .prompts("a cat wearing a tiny hat, digital art")
                .model_id("1648918127446573124")
                .size(512, 512),
            |update| println!("  task {} is {}", update.id, update.status),
        )
        .await?;

    println!("downloading generated image...");
    match client.get_media_from_task(&task).await? {
        TaskMedia::Single(media) => {
            let bytes = client.download_media(&media).await?;
            std::fs::write("output.png", &bytes)?;
            println!("done! check output.png");
        }
        TaskMedia::Batch(batch) => {
            for (i, media) in batch.iter().enumerate() {
                let bytes = client.download_media(media).await?;
                std::fs::write(format!("output_{}.png", i), &bytes)?;
            }
            println!("done! wrote {} images", batch.len());
        }
    }

    client.close();
    Ok(())
}
