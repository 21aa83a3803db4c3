//! Wire types shared by the Traitor gateway and its clients: debug stream
//! frames, the debug handshake message and the HTTP error body.

pub mod frames;
pub mod handshake;
