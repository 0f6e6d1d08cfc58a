// SPDX-License-Identifier: GPL-3.0-only
//! ACPI notifications read from the acpid socket
//!
//! acpid relays kernel ACPI events as text lines of the form
//! `class bus_id type data`, e.g. `video DD1F 00000086 00000000`, with type
//! and data in hex. The type is the notification code and becomes the
//! payload of a device notification for the node named `bus_id`.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;

use crate::error::Result;
use crate::registry::HardwareMessage;
use crate::registry::parse_hex;
use crate::registry::tree::DeviceTree;

/// One event line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcpidEvent {
    pub class: String,
    pub bus_id: String,
    pub kind: u32,
    pub data: u32,
}

impl AcpidEvent {
    pub fn to_message(&self) -> HardwareMessage {
        HardwareMessage::device_notification(self.bus_id.clone(), self.kind)
    }
}

/// Parse an acpid event line; anything malformed yields `None`
pub fn parse_event(line: &str) -> Option<AcpidEvent> {
    let mut fields = line.split_whitespace();
    let class = fields.next()?;
    let bus_id = fields.next()?;
    let kind = parse_hex(fields.next()?)?;
    let data = parse_hex(fields.next()?)?;

    Some(AcpidEvent {
        class: class.to_string(),
        bus_id: bus_id.to_string(),
        kind: u32::try_from(kind).ok()?,
        data: u32::try_from(data).ok()?,
    })
}

/// Forward acpid events to the interests registered on `tree`
///
/// Never returns `Ok`: acpid closing the connection is reported as
/// [`std::io::ErrorKind::UnexpectedEof`].
pub async fn listen(socket: &Path, tree: &DeviceTree) -> Result<()> {
    let stream = UnixStream::connect(socket).await?;
    info!("Listening for ACPI events on {}", socket.display());

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_event(&line) {
            Some(event) => {
                let delivered = tree.notify_source(&event.bus_id, event.to_message());
                trace!("{:?} delivered to {} interest(s)", event, delivered);
            }
            None => debug!("Skipping acpid line {:?}", line),
        }
    }

    warn!("acpid closed {}", socket.display());
    Err(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("acpid closed {}", socket.display()),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::tree::{DeviceTreeBuilder, NodeSpec};
    use crate::registry::{DeviceRegistry, HardwareMessage};
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_parse_video_event() {
        assert_eq!(
            parse_event("video DD1F 00000086 00000000"),
            Some(AcpidEvent {
                class: "video".to_string(),
                bus_id: "DD1F".to_string(),
                kind: 0x86,
                data: 0,
            })
        );
        assert_eq!(
            parse_event("video/brightnessdown BRTDN 00000087 00000000 K").map(|e| e.kind),
            Some(0x87)
        );
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert_eq!(parse_event(""), None);
        assert_eq!(parse_event("button/power PBTN"), None);
        assert_eq!(parse_event("video DD1F zz 00000000"), None);
        assert_eq!(parse_event("video DD1F 1ffffffff 0"), None);
    }

    #[tokio::test]
    async fn test_listen_delivers_then_fails_on_close() {
        let dir = std::env::temp_dir().join(format!("acpid-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("acpid.socket");
        let _ = std::fs::remove_file(&socket);
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();

        let mut builder = DeviceTreeBuilder::new();
        let panel = builder.root(NodeSpec::new("DD1F").platform("\\_SB.DD1F"));
        let tree = builder.build();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let _notifier = tree
            .register_interest(
                &tree.node(panel),
                Arc::new(move |message: HardwareMessage| sink.lock().unwrap().push(message)),
            )
            .unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"video DD1F 00000086 00000000\ngarbage\nvideo DD02 00000087 00000000\n")
                .await
                .unwrap();
        });

        let result = listen(&socket, &tree).await;
        server.await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(
            *received.lock().unwrap(),
            vec![HardwareMessage::device_notification("DD1F", 0x86)]
        );
        assert!(matches!(
            result,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }
}
