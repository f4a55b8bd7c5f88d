//! # Dynamic Message Codec
//!
//! Implements `tonic::codec::Codec` for [`DynamicMessage`], so `tonic` can carry messages built
//! from a runtime descriptor instead of generated structs.
//!
//! 1. **Encoder**: writes the message's fields straight into the gRPC buffer.
//! 2. **Decoder**: merges the raw bytes into an empty message of the expected output type.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec bridging [`DynamicMessage`] and the Protobuf wire format.
///
/// Requests are already typed by the message they carry; only the response descriptor has to be
/// known up front.
pub struct DynamicMessageCodec {
    res_desc: MessageDescriptor,
}

impl DynamicMessageCodec {
    pub fn new(res_desc: MessageDescriptor) -> Self {
        Self { res_desc }
    }
}

impl Codec for DynamicMessageCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicMessageEncoder;
    type Decoder = DynamicMessageDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicMessageEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicMessageDecoder(self.res_desc.clone())
    }
}

pub struct DynamicMessageEncoder;

impl Encoder for DynamicMessageEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

pub struct DynamicMessageDecoder(MessageDescriptor);

impl Decoder for DynamicMessageDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.0.clone());
        msg.merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {e}")))?;

        Ok(Some(msg))
    }
}
