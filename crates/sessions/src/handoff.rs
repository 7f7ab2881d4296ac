use std::{
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    anyhow::{Context, Result},
    base64::{Engine as _, engine::general_purpose::STANDARD},
    qrcode::QrCode,
    tokio::sync::oneshot,
};

/// How a creation attempt resolved for the waiting HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A pairing code was issued; rendered as a PNG data URL.
    PairingCode(String),
    /// The connection opened directly without issuing a code.
    Connected,
    /// A live or in-flight session already exists for this id.
    AlreadyActive,
    Failed(String),
}

/// One-shot handoff between an in-flight HTTP creation call and the first
/// lifecycle-resolving event of its connection attempt. Completes at most
/// once across the whole attempt, including automatic retries.
pub struct QrWaiter {
    tx: Mutex<Option<oneshot::Sender<CreateOutcome>>>,
    resolved: AtomicBool,
}

impl QrWaiter {
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<CreateOutcome>) {
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            resolved: AtomicBool::new(false),
        });
        (waiter, rx)
    }

    /// Deliver an outcome. Returns true if this call actually completed the
    /// waiter; later calls are no-ops and return false.
    pub fn complete(&self, outcome: CreateOutcome) -> bool {
        let sender = self.tx.lock().ok().and_then(|mut guard| guard.take());
        match sender {
            Some(tx) => {
                self.resolved.store(true, Ordering::SeqCst);
                // A dropped receiver means the caller went away; the
                // attempt is still considered resolved.
                let _ = tx.send(outcome);
                true
            },
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

/// Render a pairing code as a PNG data URL for display in a browser or
/// embedding in an API response.
pub fn render_qr_data_url(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).context("pairing code does not fit a QR code")?;
    let image = qr.render::<image::Luma<u8>>().build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("failed to encode QR PNG")?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
