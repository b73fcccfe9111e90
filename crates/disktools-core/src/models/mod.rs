//! Request and response types shared by the fetcher, storage and manager.

pub mod request;
pub mod response;

pub use request::FetchRequest;
pub use reqwest::Method;
pub use response::{CapturedResponse, ResponseSource, ServedResponse};
