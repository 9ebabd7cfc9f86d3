//! Locally synthesized replies

use crate::dns::{Message, MessageType, OpCode, ResponseCode};

/// Build an answerless reply to `request` with the given response code
///
/// The ID, opcode, RD flag and question section of the request are echoed.
pub fn error_response(request: &Message, rcode: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(false)
        .set_response_code(rcode);
    response.add_queries(request.queries().iter().cloned());
    response
}

/// FORMERR reply for a request that could not be parsed
pub fn format_error(id: u16) -> Message {
    Message::error_msg(id, OpCode::Query, ResponseCode::FormErr)
}
