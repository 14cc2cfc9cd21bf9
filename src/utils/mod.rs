pub mod decompression;
pub mod deterministic_uuid;
pub mod http_client;
pub mod http_client_factory;
pub mod url;
pub mod xmltv_parser;

pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::{DecompressingHttpClient, StandardHttpClient};
pub use http_client_factory::HttpClientFactory;
pub use url::UrlUtils;
