//! Network distribution of annotated frames and TTC triples.
//!
//! Both channels are latest-value push servers: each subscriber receives the newest
//! payload, length-prefixed, and skips whatever it was too slow to see.

pub mod channels;
pub mod codec;
pub mod framing;
pub mod push;

pub use channels::{
    decode_jpeg, encode_jpeg, wire_triple, FrameClient, FramePublisher, FrameServer, TtcClient,
    TtcPublisher, TtcServer, DEFAULT_FRAME_ADDR, DEFAULT_JPEG_QUALITY, DEFAULT_TTC_ADDR,
};
pub use codec::{decode_float, encode_float, TtcEncoding};
pub use framing::{read_frame, write_frame};
pub use push::{Broadcast, PushHandle, PushServer, Publisher};
