//! Speech recognition sessions
//!
//! A session wraps one listening cycle on the host speech-to-text engine.
//! Hosts report results, errors and end-of-session as messages on the
//! pipeline channel; termination is only ever signalled by `End`.

mod console;
mod session;

pub use console::{ConsoleRecognizer, ConsoleTiming, UnavailableRecognizer};
pub use session::{
    RecognitionErrorCode, RecognizerConfig, RecognizerError, RecognizerEvent, RecognizerEventKind,
    RecognizerSession, SessionId, SpeechRecognizer, Transcript,
};
