//! Upload a reference image from a URL, then use it for img2img.
//!
//! ```sh
//! PIXAI_API_KEY=... cargo run --example upload
//! ```

use pixai_rs::{PixaiClient, TaskParameters, UploadSource};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let api_key = std::env::var("PIXAI_API_KEY").expect("set PIXAI_API_KEY");
    let client = PixaiClient::new(api_key);

    println!("uploading reference image...");
    let media = client
        .upload_media(UploadSource::url(
            "https://upload.wikimedia.org/wikipedia/commons/3/3a/Cat03.jpg",
        ))
        .await?;
    println!("uploaded as media {}", media.id);

    let task = client
        .generate_image(
            &TaskParameters::new()
                .prompts("the same cat, watercolor style")
                .model_id("1648918127446573124")
                .media_id(media.id.clone())
                .strength(0.6)
                .size(512, 512),
        )
        .await?;

    println!("task {} finished with status {}", task.id, task.status);
    client.close();
    Ok(())
}
