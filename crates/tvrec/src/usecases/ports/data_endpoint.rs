use std::io;
use std::sync::Arc;

/// Viewer connection that receives streamed recording bytes.
pub trait DataEndpoint: Send + Sync {
    fn write_block(&self, data: &[u8]) -> io::Result<()>;
}

pub type DataEndpointHandle = Arc<dyn DataEndpoint>;
