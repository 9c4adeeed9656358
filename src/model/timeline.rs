use chrono::{DateTime, Datelike, Duration, DurationRound, Utc};

/// Marker granularity picked from the span of the visible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineScale {
    Hours,
    Days,
    Weeks,
}

impl TimelineScale {
    /// Up to one day shows hours, up to two weeks shows days, beyond that weeks.
    pub fn for_span(span: Duration) -> Self {
        if span <= Duration::days(1) {
            TimelineScale::Hours
        } else if span <= Duration::weeks(2) {
            TimelineScale::Days
        } else {
            TimelineScale::Weeks
        }
    }

    fn step(self) -> Duration {
        match self {
            TimelineScale::Hours => Duration::hours(1),
            TimelineScale::Days => Duration::days(1),
            TimelineScale::Weeks => Duration::weeks(1),
        }
    }

    fn label(self, t: DateTime<Utc>) -> String {
        match self {
            TimelineScale::Hours => t.format("%H:%M").to_string(),
            TimelineScale::Days => t.format("%a %d %b").to_string(),
            TimelineScale::Weeks => t.format("W%V %b").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub label: String,
    pub time: DateTime<Utc>,
    pub pixel: f32,
}

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 16.0;

/// Time-to-pixel mapping for one rendering of the board.
///
/// A pure function of `(range_start, range_end, zoom, pixel_width)`. Zoom
/// only scales pixel density; the time range is never altered by it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub zoom: f32,
    pub pixel_width: f32,
    pub scale: TimelineScale,
    /// Pixels per second after zoom.
    pixels_per_second: f64,
    pub markers: Vec<Marker>,
}

impl TimeAxis {
    pub fn layout(
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        zoom: f32,
        pixel_width: f32,
    ) -> Self {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let span_secs = (range_end - range_start).num_seconds();

        if span_secs <= 0 {
            return Self {
                range_start,
                range_end: range_start,
                zoom,
                pixel_width,
                scale: TimelineScale::Hours,
                pixels_per_second: 0.0,
                markers: vec![Marker {
                    label: TimelineScale::Hours.label(range_start),
                    time: range_start,
                    pixel: 0.0,
                }],
            };
        }

        let pixels_per_second = pixel_width.max(1.0) as f64 / span_secs as f64 * zoom as f64;
        let scale = TimelineScale::for_span(range_end - range_start);
        let mut axis = Self {
            range_start,
            range_end,
            zoom,
            pixel_width,
            scale,
            pixels_per_second,
            markers: Vec::new(),
        };
        axis.markers = axis.build_markers();
        axis
    }

    /// Convert a time to an x-pixel offset from the range start.
    pub fn to_x(&self, time: DateTime<Utc>) -> f32 {
        let secs = (time - self.range_start).num_seconds() as f64;
        (secs * self.pixels_per_second) as f32
    }

    /// Convert an x-pixel offset back to a time, to the nearest second.
    pub fn to_time(&self, x: f32) -> DateTime<Utc> {
        if self.pixels_per_second <= 0.0 {
            return self.range_start;
        }
        let secs = (x as f64 / self.pixels_per_second).round() as i64;
        self.range_start + Duration::seconds(secs)
    }

    /// Pixel width of a duration at this zoom level.
    pub fn width_of(&self, duration: Duration) -> f32 {
        (duration.num_seconds() as f64 * self.pixels_per_second) as f32
    }

    /// Total canvas width for the range.
    pub fn total_width(&self) -> f32 {
        self.to_x(self.range_end)
    }

    pub fn is_degenerate(&self) -> bool {
        self.pixels_per_second <= 0.0
    }

    fn build_markers(&self) -> Vec<Marker> {
        let step = self.scale.step();
        let mut t = align(self.range_start, self.scale);
        if t < self.range_start {
            t += step;
        }
        let mut markers = Vec::new();
        while t <= self.range_end {
            markers.push(Marker {
                label: self.scale.label(t),
                time: t,
                pixel: self.to_x(t),
            });
            t += step;
        }
        markers
    }
}

/// Floor `t` to the start of its hour, day, or ISO week.
fn align(t: DateTime<Utc>, scale: TimelineScale) -> DateTime<Utc> {
    match scale {
        TimelineScale::Hours => t.duration_trunc(Duration::hours(1)).unwrap_or(t),
        TimelineScale::Days => t.duration_trunc(Duration::days(1)).unwrap_or(t),
        TimelineScale::Weeks => {
            let day = t.duration_trunc(Duration::days(1)).unwrap_or(t);
            day - Duration::days(day.weekday().num_days_from_monday() as i64)
        }
    }
}

/// Round `t` to the nearest multiple of `interval_minutes` since midnight UTC.
pub fn snap(t: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    if interval_minutes <= 0 {
        return t;
    }
    t.duration_round(Duration::minutes(interval_minutes))
        .unwrap_or(t)
}
