mod accept;
mod cache_policy;
mod datagram;
mod fin_datagram;
mod open_datagram;
mod open_stream;
mod post;
mod receiver;
mod repair;
mod request_repair;
mod sender;
mod start_point;

pub use accept::*;
pub use cache_policy::*;
pub use datagram::*;
pub use fin_datagram::*;
pub use open_datagram::*;
pub use open_stream::*;
pub use post::*;
pub use receiver::*;
pub use repair::*;
pub use request_repair::*;
pub use sender::*;
pub use start_point::*;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

use bytes::{Buf, BufMut};

use std::fmt;

// Control messages travel on a bidirectional stream, each frame prefixed by a
// 16-bit big-endian length (see Sender/Receiver). Datagrams use the bare
// header in datagram.rs instead.

// Use a macro to generate the message types rather than copy-paste.
// This implements a decode/encode method that uses the specified type.
macro_rules! message_types {
    {$($name:ident = $val:expr,)*} => {
		#[derive(Clone, PartialEq, Eq)]
		pub enum Message {
			$($name($name)),*
		}

		impl Message {
			/// The single-byte tag the message is written with.
			pub fn tag(&self) -> u8 {
				match self {
					$(Self::$name(_) => $val,)*
				}
			}
		}

		impl Decode for Message {
			fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
				let tag = u8::decode(buf)?;

				match tag {
					$($val => Ok(Self::$name($name::decode(buf)?)),)*
					_ => Err(DecodeError::InvalidMessage(tag)),
				}
			}
		}

		impl Encode for Message {
			fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
				match self {
					$(Self::$name(ref m) => {
						($val as u8).encode(buf)?;
						m.encode(buf)
					},)*
				}
			}
		}

		$(impl From<$name> for Message {
			fn from(m: $name) -> Self {
				Message::$name(m)
			}
		})*

		impl fmt::Debug for Message {
			// Delegate to the message formatter
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				match self {
					$(Self::$name(ref m) => m.fmt(f),)*
				}
			}
		}
    }
}

// Each message is prefixed with the given single-byte tag.
message_types! {
	OpenStream = 0x1,
	OpenDatagram = 0x2,
	FinDatagram = 0x3,
	RequestRepair = 0x4,
	Repair = 0x5,
	Post = 0x6,
	Accept = 0x7,
	StartPoint = 0x8,
	CachePolicy = 0x9,
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::{Bytes, BytesMut};

	fn all_messages() -> Vec<Message> {
		vec![
			OpenStream {
				url: "quicr://example.net/video/1".to_string(),
			}
			.into(),
			OpenDatagram {
				url: "quicr://example.net/video/1".to_string(),
				datagram_stream_id: 7,
			}
			.into(),
			FinDatagram {
				final_group_id: 3,
				final_object_id: 100,
			}
			.into(),
			RequestRepair {
				final_object_id: 100,
				object_id: 42,
			}
			.into(),
			Repair {
				group_id: 2,
				object_id: 17,
				offset: 1200,
				queue_delay: 33_000,
				flags: 0x82,
				nb_objects_previous_group: 0,
				is_last_fragment: true,
				payload: Bytes::from_static(b"fragment bytes"),
			}
			.into(),
			Post {
				url: "quicr://example.net/audio".to_string(),
			}
			.into(),
			Accept { datagram_stream_id: 1 }.into(),
			StartPoint {
				group_id: 1,
				object_id: 0,
			}
			.into(),
			CachePolicy { is_real_time: true }.into(),
		]
	}

	#[test]
	fn round_trip() {
		for msg in all_messages() {
			let mut buf = BytesMut::new();
			msg.encode(&mut buf).unwrap();

			let mut read = buf.freeze();
			let decoded = Message::decode(&mut read).unwrap();
			assert_eq!(decoded, msg);
			assert_eq!(read.remaining(), 0);
		}
	}

	#[test]
	fn reject_truncation() {
		for msg in all_messages() {
			let mut buf = BytesMut::new();
			msg.encode(&mut buf).unwrap();
			let full = buf.freeze();

			for cut in 0..full.len() {
				let mut short = full.slice(..cut);
				assert!(
					Message::decode(&mut short).is_err(),
					"decoded from {cut} of {} bytes: {msg:?}",
					full.len()
				);
			}
		}
	}

	#[test]
	fn reject_unknown_tag() {
		let mut buf = Bytes::from_static(&[0x3f]);
		assert_eq!(Message::decode(&mut buf), Err(DecodeError::InvalidMessage(0x3f)));
	}
}
