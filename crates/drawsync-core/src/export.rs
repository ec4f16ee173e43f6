//! Export Bridge: retrieves one live document snapshot from the editor.
//!
//! The bridge owns a single pending-export slot:
//!
//! ```text
//!            request_snapshot()                 export event
//!   Idle ───────────────────────▶ Awaiting ──────────────────▶ Idle  (Ok(document))
//!    ▲                               │
//!    └───────────────────────────────┘
//!        deadline / caller dropped       (slot invalidated)
//! ```
//!
//! Whichever of {export event, deadline} comes first decides the outcome. Each
//! request gets a ticket that the editor echoes back with its export. An event
//! is accepted only while its own request is waiting: once that request times
//! out, its event is dropped even if a later request holds the slot by then.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound for a single wait, so a huge timeout cannot overflow the clock.
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `now + wait`, clamped to [`MAX_WAIT`].
pub(crate) fn deadline_after(wait: Duration) -> Instant {
    Instant::now() + wait.min(MAX_WAIT)
}

use crate::editor::{EditorPort, ExportHandler};

/// Errors from requesting a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("diagram export timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("another diagram export is already in flight")]
    Busy,

    #[error("diagram export was abandoned before it completed")]
    Abandoned,
}

/// State of the single pending-export slot.
#[derive(Debug, Default)]
enum PendingExport {
    #[default]
    Idle,
    Awaiting {
        ticket: u64,
        deadline: Instant,
        reply: oneshot::Sender<String>,
    },
}

#[derive(Debug, Default)]
struct Slot {
    pending: PendingExport,
    last_delivered: Option<String>,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bridge between async callers and the editor's callback-based export.
pub struct ExportBridge {
    editor: Arc<dyn EditorPort>,
    slot: SharedSlot,
    next_ticket: AtomicU64,
}

impl ExportBridge {
    /// Create a bridge and register it as the editor's export handler.
    pub fn attach(editor: Arc<dyn EditorPort>) -> Self {
        let slot = SharedSlot::default();
        let handler_slot = Arc::clone(&slot);
        let handler: ExportHandler =
            Arc::new(move |ticket, document| complete(&handler_slot, ticket, document));
        editor.on_export_complete(handler);

        Self {
            editor,
            slot,
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Ask the editor for its current document and wait at most `timeout`.
    ///
    /// Only one request may be outstanding; a second call made while the first
    /// is unresolved fails with [`ExportError::Busy`] without touching the
    /// first.
    pub async fn request_snapshot(&self, timeout: Duration) -> Result<String, ExportError> {
        let deadline = deadline_after(timeout);
        let (reply, receiver) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        {
            let mut slot = lock(&self.slot);
            if let PendingExport::Awaiting { .. } = slot.pending {
                return Err(ExportError::Busy);
            }
            slot.pending = PendingExport::Awaiting {
                ticket,
                deadline,
                reply,
            };
        }

        // Invalidates the slot on every exit path, including the caller
        // dropping this future mid-wait.
        let _guard = SlotGuard {
            slot: &self.slot,
            ticket,
        };

        debug!(ticket, timeout_ms = timeout.as_millis() as u64, "Export requested");
        // The slot lock is released here: editors may deliver synchronously.
        self.editor.trigger_export(ticket);

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(document)) => {
                debug!(ticket, bytes = document.len(), "Export delivered");
                lock(&self.slot).last_delivered = Some(document.clone());
                Ok(document)
            }
            Ok(Err(_)) => Err(ExportError::Abandoned),
            Err(_) => {
                warn!(ticket, timeout_ms = timeout.as_millis() as u64, "Export timed out");
                Err(ExportError::Timeout(timeout))
            }
        }
    }

    /// Deliver an export event by hand (the registered handler does the same).
    ///
    /// Returns `false` when the request behind `ticket` is no longer waiting and
    /// the document was dropped.
    pub fn deliver(&self, ticket: u64, document: String) -> bool {
        complete(&self.slot, ticket, document)
    }

    /// Whether a request is currently waiting.
    pub fn is_awaiting(&self) -> bool {
        matches!(lock(&self.slot).pending, PendingExport::Awaiting { .. })
    }

    /// Ticket of the waiting request, if any.
    pub fn pending_ticket(&self) -> Option<u64> {
        match lock(&self.slot).pending {
            PendingExport::Awaiting { ticket, .. } => Some(ticket),
            PendingExport::Idle => None,
        }
    }

    /// Deadline of the waiting request, if any.
    pub fn pending_deadline(&self) -> Option<Instant> {
        match lock(&self.slot).pending {
            PendingExport::Awaiting { deadline, .. } => Some(deadline),
            PendingExport::Idle => None,
        }
    }

    /// The most recent document a request received before its deadline.
    pub fn last_delivered(&self) -> Option<String> {
        lock(&self.slot).last_delivered.clone()
    }
}

/// Hand `document` to the waiting request if it is the one behind `ticket`.
///
/// Returns whether a live requester received it.
fn complete(slot: &SharedSlot, ticket: u64, document: String) -> bool {
    let mut slot = lock(slot);
    let waiting = match &slot.pending {
        PendingExport::Awaiting { ticket: waiting, .. } => Some(*waiting),
        PendingExport::Idle => None,
    };
    if waiting != Some(ticket) {
        warn!(
            ticket,
            waiting = ?waiting,
            bytes = document.len(),
            "Export event does not match a waiting request, dropping"
        );
        return false;
    }

    match std::mem::take(&mut slot.pending) {
        PendingExport::Awaiting { reply, .. } => {
            let delivered = reply.send(document).is_ok();
            if !delivered {
                debug!(ticket, "Export arrived after its requester went away");
            }
            delivered
        }
        PendingExport::Idle => false,
    }
}

/// Resets the slot to idle if it still belongs to `ticket`.
struct SlotGuard<'a> {
    slot: &'a SharedSlot,
    ticket: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if let PendingExport::Awaiting { ticket, .. } = slot.pending {
            if ticket == self.ticket {
                slot.pending = PendingExport::Idle;
            }
        }
    }
}
