use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// In-process notifications emitted after a mutation commits. Best-effort:
/// the durable audit trail is the activity log, not this bus, so a missed
/// event never loses information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ContactCreated(Uuid),
    EnquiryStageChanged {
        enquiry_id: Uuid,
        old_stage: String,
        new_stage: String,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        old_status: String,
        new_status: String,
    },
    BookingRescheduled(Uuid),
    InvoiceCreated(Uuid),
    InvoiceSent(Uuid),
    InvoiceStatusChanged {
        invoice_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceCancelled(Uuid),
    PaymentRecorded {
        invoice_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    PaymentDeleted {
        invoice_id: Uuid,
        payment_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel; spawn as a background task.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        debug!(?event, "event processed");
    }
}
