use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

/// A single play event, ready to be queued for scrobbling.
///
/// Immutable once constructed. The constructor takes any timezone-aware
/// `chrono::DateTime<Tz>` and normalizes it to UTC internally, so a `Listen`
/// can never hold an ambiguous, naive timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
  date: DateTime<Utc>,
  artist_name: String,
  track_title: String,
  album_title: Option<String>,
  length: Option<u32>,
  tracknumber: Option<u32>,
  mb_trackid: Option<String>,
  source: char,
  rating: Option<char>,
}

impl Listen {
  /// Creates a new `Listen`.
  ///
  /// ```
  /// use legacy_scrobbler::Listen;
  /// use chrono::Utc;
  ///
  /// let listen = Listen::new(Utc::now(), "Artist", "Track").with_length(200);
  /// assert_eq!(listen.artist_name(), "Artist");
  /// ```
  pub fn new<Tz: TimeZone>(
    date: DateTime<Tz>,
    artist_name: impl Into<String>,
    track_title: impl Into<String>,
  ) -> Self {
    Self {
      date: date.with_timezone(&Utc),
      artist_name: artist_name.into(),
      track_title: track_title.into(),
      album_title: None,
      length: None,
      tracknumber: None,
      mb_trackid: None,
      source: 'P',
      rating: None,
    }
  }

  pub fn with_album(mut self, album_title: impl Into<String>) -> Self {
    self.album_title = Some(album_title.into());
    self
  }

  pub fn with_length(mut self, length: u32) -> Self {
    self.length = Some(length);
    self
  }

  pub fn with_tracknumber(mut self, tracknumber: u32) -> Self {
    self.tracknumber = Some(tracknumber);
    self
  }

  pub fn with_mb_trackid(mut self, mb_trackid: impl Into<String>) -> Self {
    self.mb_trackid = Some(mb_trackid.into());
    self
  }

  /// Overrides the default source code (`"P"` = chosen by user). See the
  /// Audioscrobbler protocol's `o[]` field for the other single-character
  /// source codes.
  pub fn with_source(mut self, source: char) -> Self {
    self.source = source;
    self
  }

  pub fn with_rating(mut self, rating: char) -> Self {
    self.rating = Some(rating);
    self
  }

  pub fn date(&self) -> DateTime<Utc> {
    self.date
  }

  pub fn artist_name(&self) -> &str {
    &self.artist_name
  }

  pub fn track_title(&self) -> &str {
    &self.track_title
  }

  pub fn length(&self) -> Option<u32> {
    self.length
  }

  /// Unix timestamp (seconds since epoch) of this listen's start time.
  pub fn timestamp(&self) -> i64 {
    self.date.timestamp()
  }

  /// Length in seconds this listen needs to have been played to count as
  /// a scrobble, per the Audioscrobbler protocol:
  /// 240 seconds if the track is longer than 8 minutes, otherwise half the
  /// track's length. `None` if the track length is unknown.
  pub fn required_play_time(&self) -> Option<u32> {
    let length = self.length?;
    Some(if length > 480 {
      240
    } else {
      round_half_to_even(length)
    })
  }

  /// Whether this listen is eligible to be scrobbled.
  ///
  /// Without a `reference` instant, eligibility is assumed (the streaming
  /// use case: the caller already knows the track played long enough).
  /// With a `reference`, the gap between `date` and `reference` must meet
  /// or exceed `required_play_time`. A track shorter than 30 seconds is
  /// never eligible. A track of unknown length is always eligible.
  pub fn eligible_for_scrobbling(&self, reference: Option<DateTime<Utc>>) -> bool {
    let Some(length) = self.length else {
      return true;
    };
    if length < 30 {
      return false;
    }
    let Some(reference) = reference else {
      return true;
    };
    let Some(required) = self.required_play_time() else {
      return true;
    };
    let elapsed = reference.signed_duration_since(self.date);
    elapsed.num_seconds() >= i64::from(required)
  }

  /// Renders this listen as `track.nowPlaying`-style query parameters.
  pub fn nowplaying_params(&self) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    params.insert("a", self.artist_name.clone());
    params.insert("t", self.track_title.clone());
    params.insert("b", self.album_title.clone().unwrap_or_default());
    params.insert(
      "l",
      self.length.map(|l| l.to_string()).unwrap_or_default(),
    );
    params.insert(
      "n",
      self
        .tracknumber
        .map(|n| n.to_string())
        .unwrap_or_default(),
    );
    params.insert("m", self.mb_trackid.clone().unwrap_or_default());
    params
  }

  /// Renders this listen as `track.scrobble`-style query parameters at
  /// positional index `idx` within a batch.
  pub fn scrobble_params(&self, idx: usize) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert(format!("a[{idx}]"), self.artist_name.clone());
    params.insert(format!("t[{idx}]"), self.track_title.clone());
    params.insert(format!("i[{idx}]"), self.timestamp().to_string());
    params.insert(format!("o[{idx}]"), self.source.to_string());
    params.insert(
      format!("r[{idx}]"),
      self.rating.map(|r| r.to_string()).unwrap_or_default(),
    );
    // unlike nowplaying_params, absent length renders as "0", not ""
    params.insert(
      format!("l[{idx}]"),
      self.length.unwrap_or(0).to_string(),
    );
    params.insert(
      format!("b[{idx}]"),
      self.album_title.clone().unwrap_or_default(),
    );
    params.insert(
      format!("n[{idx}]"),
      self
        .tracknumber
        .map(|n| n.to_string())
        .unwrap_or_default(),
    );
    params.insert(
      format!("m[{idx}]"),
      self.mb_trackid.clone().unwrap_or_default(),
    );
    params
  }
}

/// `round(length / 2)` as Python's `round()` would compute it: ties round
/// to the nearest even integer, not always up.
fn round_half_to_even(length: u32) -> u32 {
  let half = length / 2;
  if length % 2 == 0 {
    half
  } else if half % 2 == 0 {
    half
  } else {
    half + 1
  }
}
