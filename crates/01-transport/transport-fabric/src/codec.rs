use crate::error::FabricResult;
use crate::message::Message;

/// Maps typed requests and responses of one protocol onto [`Message`]s.
pub trait Codec: Clone + 'static {
    type Request;
    type Response;

    fn encode_request(&self, request: &Self::Request) -> FabricResult<Message>;

    /// Decodes a request. `Ok(None)` means the kind id is not part of this
    /// protocol; malformed payloads of a known kind are errors.
    fn decode_request(&self, message: &Message) -> FabricResult<Option<Self::Request>>;

    fn encode_response(&self, response: &Self::Response) -> FabricResult<Message>;
    fn decode_response(&self, message: &Message) -> FabricResult<Self::Response>;

    /// Response sent for kinds the protocol does not recognise.
    fn illegal_request(&self) -> Self::Response;
}
