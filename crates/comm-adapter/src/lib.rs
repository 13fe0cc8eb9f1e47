pub mod adapter;
pub mod error;
pub mod http;
pub mod mqtt;

pub use adapter::{EdgeCommAdapter, EventCallback};
pub use error::AdapterError;
pub use http::HttpEdgeCommAdapter;
pub use mqtt::MqttEdgeCommAdapter;
