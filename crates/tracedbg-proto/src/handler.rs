//! Typed dispatch of inbound messages.

use crate::error::ProtoError;
use crate::message::{
    BreakedCall, CallTrace, ContinueBreak, Hello, Message, QueryCallTrace, Request, RequestReply,
    SetBreakPoints, Terminate,
};
use crate::types::BreakConfiguration;

/// One method per message kind.
///
/// Every method defaults to rejecting its message with
/// [`ProtoError::Unhandled`], so a side only implements what it expects to
/// receive and anything else fails loudly.
pub trait MessageHandler {
    type Error: From<ProtoError>;

    fn handle_hello(&mut self, _msg: Hello) -> Result<(), Self::Error> {
        Err(unhandled("msg.hello"))
    }

    fn handle_configuration(&mut self, _msg: BreakConfiguration) -> Result<(), Self::Error> {
        Err(unhandled("msg.cfg"))
    }

    fn handle_breaked_call(&mut self, _msg: BreakedCall) -> Result<(), Self::Error> {
        Err(unhandled("msg.break"))
    }

    fn handle_continue_break(&mut self, _msg: ContinueBreak) -> Result<(), Self::Error> {
        Err(unhandled("msg.cont"))
    }

    fn handle_terminate(&mut self, _msg: Terminate) -> Result<(), Self::Error> {
        Err(unhandled("msg.term"))
    }

    fn handle_query_call_trace(&mut self, _msg: QueryCallTrace) -> Result<(), Self::Error> {
        Err(unhandled("msg.qtrace"))
    }

    fn handle_call_trace(&mut self, _msg: CallTrace) -> Result<(), Self::Error> {
        Err(unhandled("msg.trace"))
    }

    fn handle_request(&mut self, _msg: Request) -> Result<(), Self::Error> {
        Err(unhandled("msg.req"))
    }

    fn handle_request_reply(&mut self, _msg: RequestReply) -> Result<(), Self::Error> {
        Err(unhandled("msg.reply"))
    }

    fn handle_set_break_points(&mut self, _msg: SetBreakPoints) -> Result<(), Self::Error> {
        Err(unhandled("msg.bkpt"))
    }
}

fn unhandled<E: From<ProtoError>>(kind: &'static str) -> E {
    ProtoError::Unhandled { kind }.into()
}

impl Message {
    /// Hand this message to the matching handler method.
    pub fn dispatch<H: MessageHandler + ?Sized>(self, handler: &mut H) -> Result<(), H::Error> {
        match self {
            Message::Hello(m) => handler.handle_hello(m),
            Message::Configuration(m) => handler.handle_configuration(m),
            Message::BreakedCall(m) => handler.handle_breaked_call(m),
            Message::ContinueBreak(m) => handler.handle_continue_break(m),
            Message::Terminate(m) => handler.handle_terminate(m),
            Message::QueryCallTrace(m) => handler.handle_query_call_trace(m),
            Message::CallTrace(m) => handler.handle_call_trace(m),
            Message::Request(m) => handler.handle_request(m),
            Message::RequestReply(m) => handler.handle_request_reply(m),
            Message::SetBreakPoints(m) => handler.handle_set_break_points(m),
        }
    }
}
