use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a game's prize table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeTier {
    pub label: String,
    pub prize_value: f64,
    /// Tickets per winning ticket ("1 in <odds>").
    pub odds: f64,
    pub prizes_at_start: u64,
    pub prizes_remaining: u64,
}

impl PrizeTier {
    /// Usable in ticket estimation only with positive odds and a known print run.
    pub fn is_usable(&self) -> bool {
        self.odds > 0.0 && self.prizes_at_start > 0
    }

    pub fn prizes_claimed(&self) -> u64 {
        self.prizes_at_start.saturating_sub(self.prizes_remaining)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallOdds {
    pub display: String,
    pub value: f64,
}

impl OverallOdds {
    pub fn one_in(value: f64) -> Self {
        Self {
            display: format!("1 in {value}"),
            value,
        }
    }
}

impl Default for OverallOdds {
    fn default() -> Self {
        Self::one_in(1.0)
    }
}

/// A scratch game as scraped in one cycle. Replaced wholesale next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryGame {
    pub name: String,
    pub game_number: String,
    pub price: f64,
    pub overall_odds: OverallOdds,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    /// Index 0 is the top prize tier.
    pub prize_tiers: Vec<PrizeTier>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameWithEV {
    #[serde(flatten)]
    pub game: LotteryGame,
    #[serde(rename = "initialEV")]
    pub initial_ev: f64,
    #[serde(rename = "currentEV")]
    pub current_ev: f64,
    #[serde(rename = "netInitialEV")]
    pub net_initial_ev: f64,
    #[serde(rename = "netCurrentEV")]
    pub net_current_ev: f64,
    pub ev_per_dollar: f64,
    pub estimated_total_tickets: f64,
    pub estimated_remaining_tickets: f64,
}

/// Cache-worthy payload of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub updated_at: DateTime<Utc>,
    pub games: Vec<GameWithEV>,
}

impl Snapshot {
    pub fn new(games: Vec<GameWithEV>) -> Self {
        Self {
            updated_at: Utc::now(),
            games,
        }
    }

    pub fn game(&self, game_number: &str) -> Option<&GameWithEV> {
        self.games.iter().find(|g| g.game.game_number == game_number)
    }
}
