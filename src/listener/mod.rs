//! # Stream Listener
//!
//! Consumes an ntfy topic and feeds each message to a sink.
//!
//! ## Modules
//!
//! - [`stream`]: HTTP stream consumption and line decoding
//! - [`sink`]: Printer and preview sinks

pub mod sink;
pub mod stream;

pub use sink::{MessageSink, PreviewSink, PrinterSink};
pub use stream::{
    LineOutcome, ListenerConfig, ListenerState, StreamListener, decode_line, parse_event, stream_url,
};
