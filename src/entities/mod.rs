pub mod activity;
pub mod booking;
pub mod contact;
pub mod enquiry;
pub mod invoice;
pub mod line_item;
pub mod payment;
pub mod year_counter;
