pub mod activity_feed;
pub mod activity_log;
pub mod bookings;
pub mod contacts;
pub mod enquiries;
pub mod invoices;
pub mod sequence;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

/// Shared service container wired over one connection pool.
#[derive(Clone)]
pub struct AppServices {
    pub contacts: Arc<contacts::ContactService>,
    pub enquiries: Arc<enquiries::EnquiryService>,
    pub bookings: Arc<bookings::BookingService>,
    pub invoices: Arc<invoices::InvoiceService>,
    pub invoice_numbers: Arc<sequence::InvoiceNumberService>,
    pub activity_log: Arc<activity_log::ActivityLogService>,
    pub activity_feed: Arc<activity_feed::ActivityFeedService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let invoice_numbers = Arc::new(sequence::InvoiceNumberService::new(
            db.clone(),
            config.invoice_number_prefix.clone(),
        ));

        Self {
            contacts: Arc::new(contacts::ContactService::new(
                db.clone(),
                event_sender.clone(),
            )),
            enquiries: Arc::new(enquiries::EnquiryService::new(
                db.clone(),
                event_sender.clone(),
            )),
            bookings: Arc::new(bookings::BookingService::new(
                db.clone(),
                event_sender.clone(),
            )),
            invoices: Arc::new(invoices::InvoiceService::new(
                db.clone(),
                invoice_numbers.clone(),
                event_sender,
            )),
            invoice_numbers,
            activity_log: Arc::new(activity_log::ActivityLogService::new(db.clone())),
            activity_feed: Arc::new(activity_feed::ActivityFeedService::new(db)),
        }
    }
}
