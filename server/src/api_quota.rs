/// Google API quota units per call, used to pace the leaky-bucket limiters.
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub labels_list: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    labels_list: 1,
};

pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

pub struct CalendarApiQuota {
    pub events_list: usize,
    pub events_write: usize,
}

pub const CALENDAR_API_QUOTA: CalendarApiQuota = CalendarApiQuota {
    events_list: 1,
    events_write: 1,
};

pub const CALENDAR_QUOTA_PER_SECOND: usize = 5;
