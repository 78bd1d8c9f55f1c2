//! # pixai-rs
//!
//! Async Rust client for [PixAI](https://pixai.art) — the hosted
//! image-generation platform.
//!
//! Provides a typed client for the GraphQL API, live task tracking over a
//! self-healing GraphQL-over-WebSocket subscription, and media
//! upload/download against the platform's storage providers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pixai_rs::{PixaiClient, TaskMedia, TaskParameters};
//!
//! # async fn example() -> pixai_rs::Result<()> {
//! let client = PixaiClient::new("YOUR_API_KEY");
//!
//! // Submit a task and follow it to completion over the event stream.
//! let task = client
//!     .generate_image_with_updates(
//!         &TaskParameters::new()
//!             .prompts("a cat in space")
//!             .model_id("1648918127446573124")
//!             .size(512, 512),
//!         |update| println!("status: {}", update.status),
//!     )
//!     .await?;
//!
//! // Resolve the output and download the image bytes.
//! if let TaskMedia::Single(media) = client.get_media_from_task(&task).await? {
//!     let bytes = client.download_media(&media).await?;
//!     std::fs::write("output.png", &bytes).unwrap();
//! }
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod graphql;
pub mod media;
pub mod params;
pub mod types;
mod websocket;

pub use client::{PersonalEvents, PixaiClient};
pub use error::{PixaiError, Result};
pub use media::{MediaDescriptor, MediaFile, UploadProvider, UploadSource, UploadTarget};
pub use params::{
    AnimateDiff, AnimateDiffV2, ControlNet, DynamicThresholding, LatentCouple, TaskParameters,
};
pub use types::{
    GenerationTask, MediaRecord, MediaType, MediaUrl, PersonalEventEnvelope, TaskMedia,
    TaskOutput, TaskOutputs, TaskStatus,
};
