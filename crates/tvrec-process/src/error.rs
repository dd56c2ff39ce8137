use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        })
    }
}

/// Errors from stdio access on a [`ProcessHandle`](crate::ProcessHandle).
///
/// Launch failures are not errors; they surface as a
/// [`ProcessStatus`](crate::ProcessStatus).
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{stream} was not requested for this process")]
    NotPiped { stream: StdStream },
    #[error("{stream} is closed")]
    Closed { stream: StdStream },
    #[error("Failed to {operation} {stream}: {source}")]
    Io {
        operation: &'static str,
        stream: StdStream,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn io(operation: &'static str, stream: StdStream, source: io::Error) -> Self {
        Self::Io {
            operation,
            stream,
            source,
        }
    }

    pub fn stream(&self) -> StdStream {
        match self {
            ProcessError::NotPiped { stream }
            | ProcessError::Closed { stream }
            | ProcessError::Io { stream, .. } => *stream,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            ProcessError::NotPiped { stream } => format!(
                "Launch the process with the {} flag to access {stream}.",
                match stream {
                    StdStream::Stdin => "STDIN",
                    StdStream::Stdout => "STDOUT or BUFFERED",
                    StdStream::Stderr => "STDERR or BUFFERED",
                }
            ),
            ProcessError::Closed { .. } => {
                "The process has exited and its pipes were released.".to_string()
            }
            ProcessError::Io { .. } => {
                "The child may have exited. Check its status with wait().".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessError::Io { source, .. }
                if matches!(source.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
        )
    }
}
