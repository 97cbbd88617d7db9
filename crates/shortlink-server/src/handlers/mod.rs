//! Request handlers shared by the HTTP and gRPC front ends.

pub mod deletion;
pub mod shorten;

pub use deletion::{DeletionQueue, DeletionRequest, SubmitError, UrlDeleter};
pub use shorten::{BatchItem, BatchShortened, ShortenError, Shortener};
