//! EV engine for scratch games
//! Median-based ticket estimation, no ML, deterministic for the same input.
//!
//! Print run is not published, so it is estimated per tier as `odds × count`
//! and the median across tiers is taken. Outlier tiers (huge odds, tiny
//! count) pull a mean around, the median stays put.

mod model;

pub use model::{GameWithEV, LotteryGame, OverallOdds, PrizeTier, Snapshot};

use std::cmp::Ordering;

/// Estimated number of tickets, either printed (`use_start`) or still unsold.
pub fn estimate_tickets(tiers: &[PrizeTier], use_start: bool) -> f64 {
    let mut products: Vec<f64> = tiers
        .iter()
        .filter(|t| t.odds > 0.0)
        .filter_map(|t| {
            let count = if use_start { t.prizes_at_start } else { t.prizes_remaining };
            (count > 0).then(|| t.odds * count as f64)
        })
        .collect();

    median(&mut products)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Σ(prize × prizes at start) / estimated print run
pub fn initial_ev(tiers: &[PrizeTier], estimated_total_tickets: f64) -> f64 {
    let payout: f64 = tiers
        .iter()
        .map(|t| t.prize_value * t.prizes_at_start as f64)
        .sum();
    safe_div(payout, estimated_total_tickets)
}

/// Σ(prize × prizes remaining) / estimated unsold tickets
pub fn current_ev(tiers: &[PrizeTier], estimated_remaining_tickets: f64) -> f64 {
    let payout: f64 = tiers
        .iter()
        .map(|t| t.prize_value * t.prizes_remaining as f64)
        .sum();
    safe_div(payout, estimated_remaining_tickets)
}

pub fn ev_per_dollar(current_ev: f64, price: f64) -> f64 {
    if price > 0.0 {
        current_ev / price
    } else {
        0.0
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Derives all EV fields from one scraped game.
pub fn evaluate(game: LotteryGame) -> GameWithEV {
    let estimated_total_tickets = estimate_tickets(&game.prize_tiers, true);
    let estimated_remaining_tickets = estimate_tickets(&game.prize_tiers, false);

    let initial = initial_ev(&game.prize_tiers, estimated_total_tickets);
    let current = current_ev(&game.prize_tiers, estimated_remaining_tickets);
    let price = game.price;

    GameWithEV {
        initial_ev: initial,
        current_ev: current,
        net_initial_ev: initial - price,
        net_current_ev: current - price,
        ev_per_dollar: ev_per_dollar(current, price),
        estimated_total_tickets,
        estimated_remaining_tickets,
        game,
    }
}

pub fn evaluate_all(games: Vec<LotteryGame>) -> Vec<GameWithEV> {
    games.into_iter().map(evaluate).collect()
}

/// Ranking order: higher EV per dollar first, then game number.
fn rank_order(a: &GameWithEV, b: &GameWithEV) -> Ordering {
    b.ev_per_dollar
        .total_cmp(&a.ev_per_dollar)
        .then_with(|| a.game.game_number.cmp(&b.game.game_number))
}

/// Best EV per dollar first; ties keep a stable order by game number.
pub fn rank_by_ev_per_dollar(games: &mut [GameWithEV]) {
    games.sort_by(rank_order);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub game_count: usize,
    pub best_game: Option<(String, f64)>, // (name, ev_per_dollar)
    pub mean_ev_per_dollar: f64,
}

pub fn summarize(games: &[GameWithEV]) -> SnapshotSummary {
    let best_game = games
        .iter()
        .min_by(|a, b| rank_order(a, b))
        .map(|g| (g.game.name.clone(), g.ev_per_dollar));

    let mean_ev_per_dollar = if games.is_empty() {
        0.0
    } else {
        games.iter().map(|g| g.ev_per_dollar).sum::<f64>() / games.len() as f64
    };

    SnapshotSummary {
        game_count: games.len(),
        best_game,
        mean_ev_per_dollar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(prize: f64, odds: f64, start: u64, remaining: u64) -> PrizeTier {
        PrizeTier {
            label: format!("${prize}"),
            prize_value: prize,
            odds,
            prizes_at_start: start,
            prizes_remaining: remaining,
        }
    }

    fn game(price: f64, tiers: Vec<PrizeTier>) -> LotteryGame {
        LotteryGame {
            name: "Lucky 7s".to_string(),
            game_number: "1234".to_string(),
            price,
            overall_odds: OverallOdds::one_in(3.5),
            source_url: "https://lottery.test/games/draw-and-instants/lucky-7s".to_string(),
            prize_tiers: tiers,
            last_updated: None,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn median_of_odd_count_is_middle_value() {
        // products: 1000, 3000, 2000 -> sorted middle 2000
        let tiers = vec![tier(1.0, 100.0, 10, 1), tier(1.0, 300.0, 10, 1), tier(1.0, 200.0, 10, 1)];
        assert_eq!(estimate_tickets(&tiers, true), 2000.0);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        // products: 1000, 2000, 4000, 100000
        let tiers = vec![
            tier(1.0, 100.0, 10, 1),
            tier(1.0, 200.0, 10, 1),
            tier(1.0, 400.0, 10, 1),
            tier(1.0, 100_000.0, 1, 1),
        ];
        assert_eq!(estimate_tickets(&tiers, true), 3000.0);
    }

    #[test]
    fn empty_and_invalid_tiers_estimate_zero() {
        assert_eq!(estimate_tickets(&[], true), 0.0);
        assert_eq!(estimate_tickets(&[], false), 0.0);

        let tiers = vec![tier(5.0, 0.0, 10, 10), tier(5.0, 10.0, 0, 0)];
        assert_eq!(estimate_tickets(&tiers, true), 0.0);
        assert_eq!(estimate_tickets(&tiers, false), 0.0);
    }

    #[test]
    fn invalid_tiers_are_excluded_before_median() {
        // only 50 * 4 = 200 is valid for remaining counts
        let tiers = vec![tier(5.0, 50.0, 8, 4), tier(5.0, 0.0, 8, 4), tier(5.0, 10.0, 8, 0)];
        assert_eq!(estimate_tickets(&tiers, false), 200.0);
        // for start counts the zero-odds tier is still excluded: 400, 80 -> 240
        assert_eq!(estimate_tickets(&tiers, true), 240.0);
    }

    #[test]
    fn single_tier_scenario() {
        let g = evaluate(game(5.0, vec![tier(100_000.0, 500_000.0, 10, 2)]));
        assert_eq!(g.estimated_total_tickets, 5_000_000.0);
        assert_eq!(g.estimated_remaining_tickets, 1_000_000.0);
        assert!(close(g.initial_ev, 0.20));
        assert!(close(g.net_initial_ev, -4.80));
        assert!(close(g.current_ev, 0.20));
        assert!(close(g.net_current_ev, -4.80));
        assert!(close(g.ev_per_dollar, 0.20 / 5.0));
    }

    #[test]
    fn zero_price_gives_zero_ev_per_dollar() {
        let g = evaluate(game(0.0, vec![tier(10.0, 5.0, 100, 50)]));
        assert!(g.current_ev > 0.0);
        assert_eq!(g.ev_per_dollar, 0.0);
        assert_eq!(g.net_current_ev, g.current_ev);
    }

    #[test]
    fn no_usable_tiers_gives_zero_ev() {
        let g = evaluate(game(2.0, vec![tier(10.0, 0.0, 0, 0)]));
        assert_eq!(g.initial_ev, 0.0);
        assert_eq!(g.current_ev, 0.0);
        assert_eq!(g.net_initial_ev, -2.0);
        assert_eq!(g.ev_per_dollar, 0.0);
    }

    #[test]
    fn evaluate_is_deterministic() {
        let input = game(
            10.0,
            vec![
                tier(250_000.0, 129_230.77, 39, 30),
                tier(1_000.0, 1_200.0, 4_000, 2_900),
                tier(10.0, 10.0, 500_000, 300_000),
            ],
        );
        assert_eq!(evaluate(input.clone()), evaluate(input));
    }

    #[test]
    fn ranking_puts_best_ev_per_dollar_first() {
        let mut a = evaluate(game(1.0, vec![tier(1.0, 2.0, 10, 10)]));
        a.game.game_number = "b".to_string();
        let mut b = evaluate(game(1.0, vec![tier(5.0, 2.0, 10, 10)]));
        b.game.game_number = "a".to_string();
        let mut games = vec![a, b];
        rank_by_ev_per_dollar(&mut games);
        assert_eq!(games[0].game.game_number, "a");

        let summary = summarize(&games);
        assert_eq!(summary.game_count, 2);
        assert!(close(summary.best_game.unwrap().1, 2.5));
    }

    #[test]
    fn summary_best_game_is_the_top_ranked_one() {
        let scored = |number: &str, name: &str, evpd: f64| {
            let mut g = evaluate(game(1.0, vec![tier(1.0, 2.0, 10, 10)]));
            g.game.game_number = number.to_string();
            g.game.name = name.to_string();
            g.ev_per_dollar = evpd;
            g
        };
        // tie on EV per dollar: the lower game number wins, not the later entry
        let games = vec![
            scored("1", "Lucky 7s", 0.7),
            scored("5", "Cash Blast", 0.2),
            scored("3", "Gold Rush", 0.7),
        ];

        let mut ranked = games.clone();
        rank_by_ev_per_dollar(&mut ranked);

        let (name, evpd) = summarize(&games).best_game.unwrap();
        assert_eq!(name, "Lucky 7s");
        assert_eq!(name, ranked[0].game.name);
        assert_eq!(evpd, ranked[0].ev_per_dollar);
    }

    #[test]
    fn snapshot_json_uses_wire_names() {
        let snap = Snapshot::new(vec![evaluate(game(5.0, vec![tier(100.0, 10.0, 5, 5)]))]);
        let v = serde_json::to_value(&snap).unwrap();
        assert!(v["updatedAt"].is_string());
        let g = &v["games"][0];
        assert_eq!(g["gameNumber"], "1234");
        assert!(g["evPerDollar"].is_number());
        assert!(g["initialEV"].is_number());
        assert!(g["sourceURL"].is_string());
        assert_eq!(g["prizeTiers"][0]["prizesAtStart"], 5);

        let back: Snapshot = serde_json::from_value(v).unwrap();
        assert_eq!(back, snap);
    }
}
