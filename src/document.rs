//! Feed documents and the decoder that builds them from envelope text.
//!
//! The synchronization layer treats documents as opaque; it only needs a
//! [`Decoder`]. [`BetData`] is the lottery schema WNS publishes and the
//! default document type.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FeedError;

// ── Decoder ─────────────────────────────────────────────────────────

/// Turns decoded envelope text into a structured document.
///
/// Called only for envelopes whose root is not a control message.
pub trait Decoder: Send + Sync + 'static {
    type Document: Send + 'static;

    fn decode(&self, text: &str) -> Result<Self::Document, FeedError>;
}

/// Serde-backed XML decoder.
pub struct XmlDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> XmlDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for XmlDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for XmlDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for XmlDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDecoder")
            .field("document", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Decoder for XmlDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Document = T;

    fn decode(&self, text: &str) -> Result<T, FeedError> {
        quick_xml::de::from_str(text.trim_start()).map_err(|e| FeedError::Decode(e.to_string()))
    }
}

// ── Lottery schema ──────────────────────────────────────────────────

/// Root `BetradarBetData` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetData {
    /// `Fixtures`, `Results`, ...
    #[serde(rename(deserialize = "@DocumentType"))]
    pub document_type: String,
    #[serde(rename(deserialize = "Timestamp"))]
    pub timestamp: Timestamp,
    #[serde(rename(deserialize = "Sports"), deserialize_with = "sport_list")]
    pub sports: Vec<Sport>,
}

/// When the document was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timestamp {
    #[serde(rename(deserialize = "@CreatedTime"))]
    pub created: String,
    #[serde(rename(deserialize = "@TimeZone"))]
    pub time_zone: String,
}

/// Lotteries are always sport 108.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sport {
    #[serde(rename(deserialize = "@BetradarSportID"))]
    pub id: i64,
    #[serde(rename(deserialize = "Category"))]
    pub category: Category,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    #[serde(rename(deserialize = "@BetradarCategoryID"))]
    pub id: i64,
    #[serde(rename(deserialize = "@IsoName"))]
    pub country: String,
    #[serde(rename(deserialize = "Tournament"))]
    pub tournament: Tournament,
}

/// A tournament uniquely identifies a lottery game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tournament {
    #[serde(rename(deserialize = "@BetradarTournamentID"))]
    pub id: i64,
    #[serde(rename(deserialize = "Draws"))]
    pub draws: DrawSet,
}

/// Contents of the `Draws` element: the draws and the odds offered on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawSet {
    #[serde(rename(deserialize = "Draw"))]
    pub draws: Vec<Draw>,
    #[serde(rename(deserialize = "DrawOdds"), deserialize_with = "bet_list")]
    pub bets: Vec<Bet>,
}

/// A single draw of a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Draw {
    #[serde(rename(deserialize = "@BetradarDrawID"))]
    pub id: i64,
    #[serde(rename(deserialize = "@DrawDisplayID"))]
    pub display_id: i64,
    #[serde(rename(deserialize = "@DrawType"))]
    pub draw_type: String,
    #[serde(rename(deserialize = "@TimeType"))]
    pub time_type: String,
    #[serde(rename(deserialize = "@GameType"))]
    pub game_type: String,
    #[serde(rename(deserialize = "@GameName"))]
    pub name: String,
    #[serde(rename(deserialize = "@BonusBalls"))]
    pub bonus_balls: u32,
    #[serde(rename(deserialize = "@BonusBallsDrum"))]
    pub bonus_balls_drum: String,
    #[serde(rename(deserialize = "@BonusBallsRange"))]
    pub bonus_balls_range: String,
    #[serde(rename(deserialize = "Fixture"))]
    pub fixture: Fixture,
    #[serde(rename(deserialize = "Result"), deserialize_with = "score_list")]
    pub scores: Vec<Score>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    #[serde(rename(deserialize = "DateInfo"), deserialize_with = "draw_date")]
    pub draw_date: String,
    #[serde(rename(deserialize = "StatusInfo"), deserialize_with = "draw_off")]
    pub canceled: bool,
}

/// A drawn ball. `score_type` is `draw_<n>` for regular balls and
/// `draw_b<n>` for bonus balls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Score {
    #[serde(rename(deserialize = "@Type"))]
    pub score_type: String,
    #[serde(rename(deserialize = "$text"))]
    pub value: String,
}

/// Odds offered for one bet type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bet {
    #[serde(rename(deserialize = "@OddsType"))]
    pub odds_type: i64,
    #[serde(rename(deserialize = "Odds"))]
    pub odds: Vec<Odds>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Odds {
    #[serde(rename(deserialize = "@OutComeId"))]
    pub id: Option<i64>,
    #[serde(rename(deserialize = "@OutCome"))]
    pub outcome: String,
    #[serde(rename(deserialize = "@SpecialBetValue"))]
    pub special_bet_value: String,
    #[serde(rename(deserialize = "$text"))]
    pub value: String,
}

// ── Nested element helpers ──────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
struct SportList {
    #[serde(rename = "Sport")]
    items: Vec<Sport>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BetList {
    #[serde(rename = "Bet")]
    items: Vec<Bet>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ScoreInfo {
    #[serde(rename = "ScoreInfo")]
    info: ScoreList,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ScoreList {
    #[serde(rename = "Score")]
    items: Vec<Score>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DateInfo {
    #[serde(rename = "DrawDate")]
    draw_date: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StatusInfo {
    #[serde(rename = "Off")]
    off: bool,
}

fn sport_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Sport>, D::Error> {
    SportList::deserialize(d).map(|l| l.items)
}

fn bet_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Bet>, D::Error> {
    BetList::deserialize(d).map(|l| l.items)
}

fn score_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Score>, D::Error> {
    ScoreInfo::deserialize(d).map(|r| r.info.items)
}

fn draw_date<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    DateInfo::deserialize(d).map(|i| i.draw_date)
}

fn draw_off<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    StatusInfo::deserialize(d).map(|s| s.off)
}
