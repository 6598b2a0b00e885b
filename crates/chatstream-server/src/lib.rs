//! HTTP gateway that forwards chat requests to an OpenAI-compatible provider
//! and answers with the canonical text-delta event stream.

pub mod config;
pub mod error;
pub mod image_store;
pub mod reframe;
pub mod routes;
pub mod upstream;

pub use config::ServerConfig;
pub use error::GatewayError;
pub use image_store::{DataUrl, HttpImageStore, ImageStore, ImageStoreError, offload_image};
pub use reframe::{LineReframer, ReframeMode, encode_document, reframe_document, reframe_stream};
pub use routes::{AppState, router};
pub use upstream::{UpstreamClient, UpstreamConfig, UpstreamResponse, build_provider_body};
