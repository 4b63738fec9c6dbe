use super::*;

/// Assembles a [`Bundle`] before it becomes immutable.
pub struct Builder {
    source: String,
    destination: String,
    report_to: Option<String>,
    flags: u64,
    crc_type: CrcType,
    lifetime: time::Duration,
    priority: Priority,
    creation_time: Option<time::OffsetDateTime>,
    payload: Bytes,
}

impl Builder {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            report_to: None,
            flags: 0,
            crc_type: CrcType::default(),
            lifetime: DEFAULT_LIFETIME,
            priority: Priority::default(),
            creation_time: None,
            payload: Bytes::new(),
        }
    }

    pub fn report_to(mut self, report_to: &str) -> Self {
        self.report_to = Some(report_to.to_string());
        self
    }

    pub fn flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    pub fn crc_type(mut self, crc_type: CrcType) -> Self {
        self.crc_type = crc_type;
        self
    }

    pub fn lifetime(mut self, lifetime: time::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the creation timestamp, which otherwise defaults to the build time.
    pub fn creation_time(mut self, creation_time: time::OffsetDateTime) -> Self {
        self.creation_time = Some(creation_time);
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn build(self) -> Bundle {
        Bundle {
            id: Id::new(),
            version: VERSION,
            flags: self.flags,
            report_to: self.report_to.unwrap_or_else(|| self.source.clone()),
            destination: self.destination,
            source: self.source,
            creation_time: self
                .creation_time
                .unwrap_or_else(time::OffsetDateTime::now_utc),
            lifetime: self.lifetime,
            payload: self.payload,
            crc_type: self.crc_type,
            previous_node: None,
            hop_count: 0,
            priority: self.priority,
        }
    }
}
