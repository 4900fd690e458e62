pub mod capture;
pub mod config;
pub mod http;
pub mod session;
pub mod transport;

pub use capture::{
    AudioFile, CaptureSource, MediaChunk, Recorder, RecorderSettings, RecorderState,
    WavFileRecorder, WavFileSource,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    SessionConfig, SessionController, SessionError, SessionEvent, SessionOptions, SessionState,
    SessionStatus, TransportOptions,
};
pub use transport::{
    Ack, ClientEvent, Connector, ErrorDescriptor, NatsConnector, NatsTransport, RemoteEvent,
    Transport,
};
