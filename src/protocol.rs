//! Shared protocol constants for the uptee framed upload transport

// Protocol header constants
pub const MAGIC: &[u8; 4] = b"UPTE";
pub const VERSION: u16 = 1;

// Header layout: MAGIC (4) | VERSION (2) | TYPE (1) | LENGTH (4)
pub const HEADER_LEN: usize = 11;

// Maximum frame payload size (16MB) - prevents DoS via memory exhaustion
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// Frame type IDs
pub mod frame {
    // Client -> server
    pub const STOR: u8 = 1; // payload: UTF-8 logical path
    pub const DATA: u8 = 2; // payload: raw chunk
    pub const END: u8 = 3;
    pub const ABORT: u8 = 4;
    pub const QUIT: u8 = 5;

    // Server -> client
    // payload: code u16 LE | UTF-8 message
    pub const REPLY: u8 = 6;
}

// Reply codes, borrowed from the FTP numbering so an FTP engine can pass them through
pub mod reply {
    pub const OPENING_DATA: u16 = 150;
    pub const GOODBYE: u16 = 221;
    pub const TRANSFER_COMPLETE: u16 = 226;
    pub const SERVICE_CLOSING: u16 = 421;
    pub const TRANSFER_ABORTED: u16 = 426;
    pub const LOCAL_ERROR: u16 = 451;
    pub const INSUFFICIENT_STORAGE: u16 = 452;
    pub const UNKNOWN_COMMAND: u16 = 500;
    pub const SYNTAX_ERROR: u16 = 501;
    pub const BAD_SEQUENCE: u16 = 503;
    pub const FILE_UNAVAILABLE: u16 = 550;
    pub const FILENAME_NOT_ALLOWED: u16 = 553;

    /// Positive completion or preliminary replies (1xx-3xx)
    pub fn is_positive(code: u16) -> bool {
        code < 400
    }
}

// Defaults for the configuration surface
pub mod defaults {
    pub const PORT: u16 = 21;
    pub const HOST: &str = "0.0.0.0";
    pub const ROOT: &str = "./upload";
    pub const PASSIVE_PORTS: &str = "50000-50009";

    // Session idle timeout (s)
    pub const IDLE_TIMEOUT_SECS: u64 = 4800;

    // Per-request webhook timeout (s)
    pub const WEBHOOK_TIMEOUT_SECS: u64 = 30;
}
