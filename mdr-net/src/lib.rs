// mdr-net/src/lib.rs
pub mod http;
pub mod repository;
pub mod retry;
pub mod transport;
pub mod validation;

pub use http::{build_http_client, HttpTransport};
pub use repository::RepositoryClient;
pub use retry::RetryPolicy;
pub use transport::{FetchOutcome, Transport};
pub use validation::{validate_relative_path, validate_repository_url};
