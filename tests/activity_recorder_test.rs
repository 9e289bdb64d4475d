mod common;

use rust_decimal_macros::dec;
use serde_json::json;

use clientdesk::entities::activity::{ActivityPayload, ActivityType};
use clientdesk::entities::booking::BookingStatus;
use clientdesk::entities::enquiry::EnquiryStage;
use clientdesk::services::bookings::UpdateBookingRequest;
use clientdesk::services::contacts::UpdateContactRequest;
use clientdesk::services::enquiries::CreateEnquiryRequest;

use common::TestApp;

#[tokio::test]
async fn contact_update_records_field_level_diff() {
    let app = TestApp::new().await;
    let contact = app.seed_contact("Ada", "Lovelace").await;

    app.state
        .services
        .contacts
        .update_contact(
            contact.id,
            UpdateContactRequest {
                phone: Some("+44 20 7946 0000".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let activities = app
        .state
        .services
        .activity_log
        .latest_for_entity(contact.id, 10)
        .await
        .unwrap();
    assert_eq!(activities.len(), 2); // CONTACT_CREATED + CONTACT_UPDATED
    assert_eq!(activities[0].activity_type, ActivityType::ContactUpdated);

    match activities[0].typed_payload().unwrap() {
        ActivityPayload::ContactUpdated { changes } => {
            assert_eq!(changes.len(), 1);
            let change = &changes["phone"];
            assert_eq!(change.from, serde_json::Value::Null);
            assert_eq!(change.to, json!("+44 20 7946 0000"));
        }
        other => panic!("expected CONTACT_UPDATED, got {other:?}"),
    }
}

#[tokio::test]
async fn no_op_update_emits_no_activity() {
    let app = TestApp::new().await;
    let contact = app.seed_contact("Ada", "Lovelace").await;

    app.state
        .services
        .contacts
        .update_contact(
            contact.id,
            UpdateContactRequest {
                first_name: Some("Ada".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let activities = app
        .state
        .services
        .activity_log
        .latest_for_entity(contact.id, 10)
        .await
        .unwrap();
    assert_eq!(activities.len(), 1, "only CONTACT_CREATED");
}

#[tokio::test]
async fn stage_change_is_specific_and_excludes_the_generic_activity() {
    let app = TestApp::new().await;
    let contact = app.seed_contact("Ada", "Lovelace").await;
    let enquiry = app
        .state
        .services
        .enquiries
        .create_enquiry(CreateEnquiryRequest {
            contact_id: contact.id,
            subject: "Spring wedding".into(),
            notes: None,
        })
        .await
        .unwrap();

    app.state
        .services
        .enquiries
        .update_stage(enquiry.id, EnquiryStage::Quoted)
        .await
        .unwrap();

    let activities = app
        .state
        .services
        .activity_log
        .latest_for_entity(enquiry.id, 10)
        .await
        .unwrap();
    assert_eq!(activities.len(), 2); // ENQUIRY_CREATED + STAGE_CHANGED
    assert_eq!(activities[0].activity_type, ActivityType::StageChanged);

    match activities[0].typed_payload().unwrap() {
        ActivityPayload::StageChanged { from, to } => {
            assert_eq!(from, "NEW");
            assert_eq!(to, "QUOTED");
        }
        other => panic!("expected STAGE_CHANGED, got {other:?}"),
    }

    // moving to the same stage again is a no-op
    app.state
        .services
        .enquiries
        .update_stage(enquiry.id, EnquiryStage::Quoted)
        .await
        .unwrap();
    let unchanged = app
        .state
        .services
        .activity_log
        .latest_for_entity(enquiry.id, 10)
        .await
        .unwrap();
    assert_eq!(unchanged.len(), 2);
}

#[tokio::test]
async fn booking_lifecycle_emits_specific_activities() {
    let app = TestApp::new().await;
    let contact = app.seed_contact("Ada", "Lovelace").await;
    let booking = app
        .seed_booking(contact.id, "Venue hire", dec!(300))
        .await;

    app.state
        .services
        .bookings
        .update_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();

    let new_start = booking.starts_at + chrono::Duration::days(3);
    app.state
        .services
        .bookings
        .reschedule(booking.id, new_start, new_start + chrono::Duration::hours(2))
        .await
        .unwrap();

    app.state
        .services
        .bookings
        .update_booking(
            booking.id,
            UpdateBookingRequest {
                location: Some("Riverside hall".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let activities = app
        .state
        .services
        .activity_log
        .latest_for_entity(booking.id, 10)
        .await
        .unwrap();
    let types: Vec<ActivityType> = activities.iter().map(|a| a.activity_type).collect();
    assert_eq!(
        types,
        vec![
            ActivityType::BookingUpdated,
            ActivityType::BookingRescheduled,
            ActivityType::BookingStatusChanged,
            ActivityType::BookingCreated,
        ]
    );

    let rescheduled = activities
        .iter()
        .find(|a| a.activity_type == ActivityType::BookingRescheduled)
        .unwrap();
    match rescheduled.typed_payload().unwrap() {
        ActivityPayload::BookingRescheduled { from, to } => {
            assert_eq!(to, new_start);
            assert!(from < to);
        }
        other => panic!("expected BOOKING_RESCHEDULED, got {other:?}"),
    }
}
