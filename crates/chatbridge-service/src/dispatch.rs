//! Raw inbound dispatch.

use chatbridge_protocol::{ChatMsg, CmdMsg, Codec, JsonCodec, ProtocolError};

use crate::Receiver;

/// Decodes one raw inbound message and hands it to `receiver`.
///
/// Bytes containing `"cmd` are first read as a [`CmdMsg`] and dispatched as
/// a command if typed `cmd`. Everything else is read as a [`ChatMsg`].
///
/// # Errors
/// Returns the decode error when the bytes are not a message. Nothing is
/// dispatched in that case.
pub async fn dispatch_msg<R>(receiver: &R, raw: &[u8]) -> Result<(), ProtocolError>
where
    R: Receiver + ?Sized,
{
    if contains(raw, br#""cmd"#) {
        let cmd: CmdMsg = JsonCodec.decode(raw)?;
        if cmd.is_type("cmd") {
            receiver.cmd_handler(cmd).await;
            return Ok(());
        }
        // "cmd appeared elsewhere in the payload.
    }
    let msg: ChatMsg = JsonCodec.decode(raw)?;
    receiver.handler(msg).await;
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        chats: Mutex<Vec<ChatMsg>>,
        cmds: Mutex<Vec<CmdMsg>>,
    }

    #[async_trait]
    impl Receiver for Capture {
        async fn handler(&self, msg: ChatMsg) {
            self.chats.lock().unwrap().push(msg);
        }

        async fn cmd_handler(&self, msg: CmdMsg) {
            self.cmds.lock().unwrap().push(msg);
        }
    }

    #[tokio::test]
    async fn test_dispatch_msg_command() {
        let rcv = Capture::default();
        dispatch_msg(&rcv, br#"{"type":"cmd","id":"1","cmd":"ping","args":["hi"]}"#)
            .await
            .unwrap();
        let cmds = rcv.cmds.lock().unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].command, "ping");
        assert!(rcv.chats.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_msg_cmd_text_in_chat() {
        let rcv = Capture::default();
        let raw = br#"{"type":"msg","id":"1","net":{"id":"n","type":"net"},"msg":[{"type":"text/plain","content":"\"cmd"}]}"#;
        dispatch_msg(&rcv, raw).await.unwrap();
        assert!(rcv.cmds.lock().unwrap().is_empty());
        assert_eq!(rcv.chats.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_msg_malformed() {
        let rcv = Capture::default();
        let err = dispatch_msg(&rcv, b"{nope").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(rcv.chats.lock().unwrap().is_empty());
    }
}
