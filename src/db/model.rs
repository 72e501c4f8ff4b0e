//! Query filters and view models used by repositories.
//!
//! Keep these structs focused on what queries need. Business logic should
//! live in higher layers.

use crate::model::{BookingStatus, Modality};

/// Filter for booking listings. Fields are ANDed; `None` means unconstrained.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub teacher_id: Option<String>,
    pub student_id: Option<String>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct PostedTimeFilter {
    pub teacher_id: Option<String>,
    pub modality: Option<Modality>,
    pub only_available: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClassRequestFilter {
    pub student_id: Option<String>,
    pub modality: Option<Modality>,
    pub only_active: bool,
}
