use crate::resp::code;

/// One-line description of a message, for trace output
/// e.g. `2.05 Content: Ack with 5 byte payload`
pub(crate) fn msg_summary(msg: &toad_msg::alloc::Message) -> String {
  format!("{}.{:02} {}: {:?} with {} byte payload",
          msg.code.class,
          msg.code.detail,
          code::to_human(msg.code),
          msg.ty,
          msg.payload.0.len())
}
