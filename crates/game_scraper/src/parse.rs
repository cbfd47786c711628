//! Prize page parsing.
//!
//! Best-effort over reverse-engineered markup: every row that does not fit
//! is skipped with a named reason and counted, never an error.
//!
//! Row layout (cells are concatenated text, no separators):
//!   cell 0: `$250,0001 in 129,230.77 odds`
//!   cell 1: `39 Start9 Claimed30 Remaining`

use ev_engine::{LotteryGame, OverallOdds, PrizeTier};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static ODDS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)1\s*in\s*(\d[\d,]*(?:\.\d+)?)").expect("odds marker regex")
});

static COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*)\s*start\s*(?:(\d[\d,]*)\s*claimed\s*)?(\d[\d,]*)\s*remaining")
        .expect("counts regex")
});

static LAST_UPDATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(last\s+updated|as\s+of)\b").expect("last updated regex")
});

static PAGE_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)price\s*:?\s*\$\s*(\d[\d,]*(?:\.\d{1,2})?)").expect("page price regex")
});

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("table selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").expect("title selector"));

const TITLE_DELIMITERS: [&str; 5] = ["|", " - ", " – ", "–", ":"];

/// Why a table row did not become a prize tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowSkip {
    TooFewCells,
    NoOddsMarker,
    BadPrizeAmount,
    BadOdds,
    NoCounts,
    NonPositivePrize,
    NonPositiveOdds,
    NoStartCount,
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowSkip::TooFewCells => "too_few_cells",
            RowSkip::NoOddsMarker => "no_odds_marker",
            RowSkip::BadPrizeAmount => "bad_prize_amount",
            RowSkip::BadOdds => "bad_odds",
            RowSkip::NoCounts => "no_counts",
            RowSkip::NonPositivePrize => "non_positive_prize",
            RowSkip::NonPositiveOdds => "non_positive_odds",
            RowSkip::NoStartCount => "no_start_count",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseStats {
    pub tables_seen: usize,
    pub tables_used: usize,
    pub rows_accepted: usize,
    pub skipped: BTreeMap<RowSkip, usize>,
}

impl ParseStats {
    fn skip(&mut self, why: RowSkip) {
        *self.skipped.entry(why).or_default() += 1;
    }

    pub fn rows_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, why: RowSkip) -> usize {
        self.skipped.get(&why).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct GameParse {
    /// `None` when no tier could be extracted.
    pub game: Option<LotteryGame>,
    pub stats: ParseStats,
}

// ── Field rules ──────────────────────────────────────────────────────────────

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    cleaned.parse().ok()
}

fn parse_count(s: &str) -> Option<u64> {
    s.replace(',', "").parse().ok()
}

/// Final non-empty path segment, query and fragment stripped.
pub fn game_number_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|seg| !seg.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// `lucky-7s` → `Lucky 7s`
pub fn name_from_slug(url: &str) -> String {
    game_number_from_url(url)
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text before the first title delimiter, or the URL slug when that is empty.
pub fn parse_title_name(title: &str, url: &str) -> String {
    let title = collapse_ws(title);
    let cut = TITLE_DELIMITERS
        .iter()
        .filter_map(|d| title.find(d))
        .min()
        .unwrap_or(title.len());

    let name = title[..cut].trim();
    if name.is_empty() {
        name_from_slug(url)
    } else {
        name.to_string()
    }
}

/// `(prize amount, odds)` from cell 0. Free-ticket prizes are worth the ticket price.
pub fn parse_prize_cell(cell: &str, ticket_price: f64) -> Result<(String, f64, f64), RowSkip> {
    let cell = collapse_ws(cell);
    let caps = ODDS_MARKER.captures(&cell).ok_or(RowSkip::NoOddsMarker)?;
    let marker = caps.get(0).ok_or(RowSkip::NoOddsMarker)?;

    let label = cell[..marker.start()].trim().to_string();
    let lower = label.to_lowercase();
    let prize = if lower.contains("free") || lower.contains("ticket") {
        ticket_price
    } else {
        parse_number(&label).ok_or(RowSkip::BadPrizeAmount)?
    };

    let odds = parse_number(&caps[1]).ok_or(RowSkip::BadOdds)?;
    Ok((label, prize, odds))
}

/// `(start, claimed, remaining)` from cell 1. Claimed may be missing on some layouts.
pub fn parse_counts_cell(cell: &str) -> Result<(u64, Option<u64>, u64), RowSkip> {
    let cell = collapse_ws(cell);
    let caps = COUNTS.captures(&cell).ok_or(RowSkip::NoCounts)?;

    let start = parse_count(&caps[1]).ok_or(RowSkip::NoCounts)?;
    let claimed = caps.get(2).and_then(|m| parse_count(m.as_str()));
    let remaining = parse_count(&caps[3]).ok_or(RowSkip::NoCounts)?;
    Ok((start, claimed, remaining))
}

/// One table row → tier, with the acceptance rule (prize, odds and start count > 0).
pub fn parse_row(cells: &[String], ticket_price: f64) -> Result<PrizeTier, RowSkip> {
    if cells.len() < 2 {
        return Err(RowSkip::TooFewCells);
    }

    let (label, prize_value, odds) = parse_prize_cell(&cells[0], ticket_price)?;
    let (start, _claimed, remaining) = parse_counts_cell(&cells[1])?;

    if prize_value <= 0.0 {
        return Err(RowSkip::NonPositivePrize);
    }
    if odds <= 0.0 {
        return Err(RowSkip::NonPositiveOdds);
    }
    if start == 0 {
        return Err(RowSkip::NoStartCount);
    }
    if remaining > start {
        debug!("Remaining {} > start {} for {}, clamping", remaining, start, label);
    }

    Ok(PrizeTier {
        label,
        prize_value,
        odds,
        prizes_at_start: start,
        prizes_remaining: remaining.min(start),
    })
}

// ── Document rules ───────────────────────────────────────────────────────────

/// Visible text nodes in document order (script/style excluded), whitespace-collapsed.
pub fn text_nodes(doc: &Html) -> Vec<String> {
    doc.tree
        .root()
        .descendants()
        .filter_map(|node| {
            let Node::Text(text) = node.value() else {
                return None;
            };
            let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
            if matches!(parent.as_deref(), Some("script" | "style" | "noscript" | "title")) {
                return None;
            }
            let t = collapse_ws(text);
            (!t.is_empty()).then_some(t)
        })
        .collect()
}

/// First `1 in N` in the "overall odds" text node or the one right after it.
pub fn find_overall_odds(texts: &[String]) -> OverallOdds {
    for (i, text) in texts.iter().enumerate() {
        if !text.to_lowercase().contains("overall odds") {
            continue;
        }
        for candidate in texts[i..].iter().take(2) {
            if let Some(caps) = ODDS_MARKER.captures(candidate) {
                if let Some(value) = parse_number(&caps[1]) {
                    return OverallOdds {
                        display: collapse_ws(&caps[0]),
                        value,
                    };
                }
            }
        }
    }
    OverallOdds::default()
}

/// First text node mentioning "last updated" / "as of", as `text_nodes`
/// returns it (whitespace already collapsed).
pub fn find_last_updated(texts: &[String]) -> Option<String> {
    texts.iter().find(|t| LAST_UPDATED.is_match(t)).cloned()
}

/// Ticket price printed on the page (`Price: $5`), if any.
pub fn find_page_price(texts: &[String]) -> Option<f64> {
    let joined = texts.join(" ");
    PAGE_PRICE
        .captures(&joined)
        .and_then(|caps| parse_number(&caps[1]))
        .filter(|p| *p > 0.0)
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

fn is_table(node: &Node) -> bool {
    node.as_element().is_some_and(|e| e.name() == "table")
}

/// Rows that belong to `table` itself, not to a table nested inside it.
fn own_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    table.select(&ROW).filter(move |row| {
        row.ancestors().find(|n| is_table(n.value())).map(|n| n.id()) == Some(table.id())
    })
}

/// Direct `<td>`/`<th>` children of a row.
fn own_cells<'a>(row: ElementRef<'a>, tag: &'static str) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == tag)
        .collect()
}

fn hosts_table(el: &ElementRef<'_>) -> bool {
    el.select(&TABLE).next().is_some()
}

/// Tables whose own header (or, lacking one, own body) mentions "prize".
/// Cells that only wrap another table do not count.
fn is_prize_table(table: ElementRef<'_>) -> bool {
    let mut header = String::new();
    let mut body = String::new();
    for row in own_rows(table) {
        for th in own_cells(row, "th") {
            header.push_str(&element_text(th));
            header.push(' ');
        }
        for td in own_cells(row, "td").into_iter().filter(|td| !hosts_table(td)) {
            body.push_str(&element_text(td));
            body.push(' ');
        }
    }
    header.to_lowercase().contains("prize") || body.to_lowercase().contains("prize")
}

pub fn parse_prize_tables(doc: &Html, ticket_price: f64) -> (Vec<PrizeTier>, ParseStats) {
    let mut tiers = Vec::new();
    let mut stats = ParseStats::default();

    for table in doc.select(&TABLE) {
        stats.tables_seen += 1;
        if !is_prize_table(table) {
            continue;
        }
        stats.tables_used += 1;

        for row in own_rows(table) {
            let tds = own_cells(row, "td");
            if tds.is_empty() || tds.iter().any(hosts_table) {
                // header row (th only) or layout row around a nested table
                continue;
            }
            let cells: Vec<String> = tds.iter().map(|c| c.text().collect::<Vec<_>>().concat()).collect();
            match parse_row(&cells, ticket_price) {
                Ok(tier) => {
                    stats.rows_accepted += 1;
                    tiers.push(tier);
                }
                Err(why) => {
                    debug!("Skipping row {:?}: {}", cells, why);
                    stats.skip(why);
                }
            }
        }
    }

    (tiers, stats)
}

/// Whole page → game. Zero tiers means the page is unparseable.
pub fn parse_game_page(html: &str, url: &str, known_price: Option<f64>) -> GameParse {
    let doc = Html::parse_document(html);
    let texts = text_nodes(&doc);

    let title = doc
        .select(&TITLE)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let price = known_price
        .filter(|p| *p > 0.0)
        .or_else(|| find_page_price(&texts))
        .unwrap_or(0.0);

    let (tiers, stats) = parse_prize_tables(&doc, price);
    if tiers.is_empty() {
        return GameParse { game: None, stats };
    }

    let game = LotteryGame {
        name: parse_title_name(&title, url),
        game_number: game_number_from_url(url),
        price,
        overall_odds: find_overall_odds(&texts),
        source_url: url.to_string(),
        prize_tiers: tiers,
        last_updated: find_last_updated(&texts),
    };

    GameParse { game: Some(game), stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(a: &str, b: &str) -> Vec<String> {
        vec![a.to_string(), b.to_string()]
    }

    #[test]
    fn concatenated_row_splits_at_odds_marker() {
        let tier = parse_row(&cells("$250,0001 in 129,230.77 odds", "39 Start9 Claimed30 Remaining"), 10.0).unwrap();
        assert_eq!(tier.prize_value, 250_000.0);
        assert_eq!(tier.odds, 129_230.77);
        assert_eq!(tier.prizes_at_start, 39);
        assert_eq!(tier.prizes_remaining, 30);
        assert_eq!(tier.label, "$250,000");
    }

    #[test]
    fn small_prizes_ending_in_one_still_split() {
        let (_, prize, odds) = parse_prize_cell("$11 in 10.00", 1.0).unwrap();
        assert_eq!(prize, 1.0);
        assert_eq!(odds, 10.0);

        let (_, prize, odds) = parse_prize_cell("$211 in 4.5", 1.0).unwrap();
        assert_eq!(prize, 21.0);
        assert_eq!(odds, 4.5);
    }

    #[test]
    fn free_ticket_prize_takes_ticket_price() {
        let tier = parse_row(&cells("Free Ticket1 in 8.33", "600,000 Start 100,000 Claimed 500,000 Remaining"), 2.0).unwrap();
        assert_eq!(tier.prize_value, 2.0);
        assert_eq!(tier.prizes_at_start, 600_000);
        assert_eq!(tier.prizes_remaining, 500_000);
    }

    #[test]
    fn free_ticket_without_known_price_is_skipped() {
        assert_eq!(
            parse_row(&cells("TICKET1 in 8", "10 Start0 Claimed10 Remaining"), 0.0),
            Err(RowSkip::NonPositivePrize)
        );
    }

    #[test]
    fn counts_without_claimed_column() {
        assert_eq!(parse_counts_cell("12 Start 7 Remaining"), Ok((12, None, 7)));
        assert_eq!(parse_counts_cell("12 Start5 Claimed7 Remaining"), Ok((12, Some(5), 7)));
    }

    #[test]
    fn skip_reasons_are_named() {
        assert_eq!(parse_row(&["$5".to_string()], 1.0), Err(RowSkip::TooFewCells));
        assert_eq!(parse_row(&cells("$5 every week", "1 Start0 Claimed1 Remaining"), 1.0), Err(RowSkip::NoOddsMarker));
        assert_eq!(parse_row(&cells("Mystery1 in 10", "1 Start0 Claimed1 Remaining"), 1.0), Err(RowSkip::BadPrizeAmount));
        assert_eq!(parse_row(&cells("$51 in 10", "sold out"), 1.0), Err(RowSkip::NoCounts));
        assert_eq!(parse_row(&cells("$01 in 10", "1 Start0 Claimed1 Remaining"), 1.0), Err(RowSkip::NonPositivePrize));
        assert_eq!(parse_row(&cells("$51 in 0", "1 Start0 Claimed1 Remaining"), 1.0), Err(RowSkip::NonPositiveOdds));
        assert_eq!(parse_row(&cells("$51 in 10", "0 Start0 Claimed0 Remaining"), 1.0), Err(RowSkip::NoStartCount));
    }

    #[test]
    fn remaining_is_clamped_to_start() {
        let tier = parse_row(&cells("$1001 in 50", "5 Start0 Claimed9 Remaining"), 1.0).unwrap();
        assert_eq!(tier.prizes_remaining, 5);
    }

    #[test]
    fn title_name_and_slug_fallback() {
        let url = "https://lottery.test/games/draw-and-instants/lucky-7s";
        assert_eq!(parse_title_name("Lucky 7s | State Lottery", url), "Lucky 7s");
        assert_eq!(parse_title_name("Gold Rush - Instant Games", url), "Gold Rush");
        assert_eq!(parse_title_name("   ", url), "Lucky 7s");
        assert_eq!(parse_title_name("| State Lottery", url), "Lucky 7s");
        assert_eq!(parse_title_name("Lucky 7s: Instant Games", url), "Lucky 7s");
        assert_eq!(parse_title_name("Cash Tower–State Lottery", url), "Cash Tower");
        assert_eq!(parse_title_name("Lucky-7 Doubler | Lottery", url), "Lucky-7 Doubler");
    }

    #[test]
    fn game_number_is_last_segment() {
        assert_eq!(game_number_from_url("https://x.test/games/draw-and-instants/1712/"), "1712");
        assert_eq!(game_number_from_url("https://x.test/games/draw-and-instants/gold-rush?tab=prizes#t"), "gold-rush");
    }

    #[test]
    fn overall_odds_label_and_value_in_separate_nodes() {
        let texts = vec!["Overall Odds:".to_string(), "1 in 3.42".to_string()];
        let odds = find_overall_odds(&texts);
        assert_eq!(odds.value, 3.42);
        assert_eq!(odds.display, "1 in 3.42");

        assert_eq!(find_overall_odds(&["Nothing here".to_string()]), OverallOdds::default());
    }

    #[test]
    fn last_updated_is_first_matching_text_node() {
        let texts = vec![
            "Prize information".to_string(),
            "Prizes remaining as of 10/18/2026".to_string(),
            "Last Updated: yesterday".to_string(),
        ];
        assert_eq!(find_last_updated(&texts).as_deref(), Some("Prizes remaining as of 10/18/2026"));
        assert_eq!(find_last_updated(&["nothing".to_string()]), None);

        // text nodes come in collapsed, so a multi-line node is one line
        let doc = Html::parse_document("<p>Last\n   Updated:\n Oct 17, 2026</p>");
        assert_eq!(find_last_updated(&text_nodes(&doc)).as_deref(), Some("Last Updated: Oct 17, 2026"));
    }

    #[test]
    fn page_price_is_found_near_label() {
        assert_eq!(find_page_price(&["Ticket Price: $10".to_string()]), Some(10.0));
        assert_eq!(find_page_price(&["Top prize $1,000,000".to_string()]), None);
    }

    #[test]
    fn non_prize_tables_are_ignored() {
        let html = r#"<html><body>
            <table><tr><th>Retailer</th></tr><tr><td>$51 in 10</td><td>1 Start0 Claimed1 Remaining</td></tr></table>
        </body></html>"#;
        let (tiers, stats) = parse_prize_tables(&Html::parse_document(html), 5.0);
        assert!(tiers.is_empty());
        assert_eq!(stats.tables_seen, 1);
        assert_eq!(stats.tables_used, 0);
    }

    #[test]
    fn page_without_tiers_is_unparseable() {
        let parsed = parse_game_page("<html><head><title>Gone</title></head><body>Coming soon</body></html>", "https://x.test/g/1", Some(5.0));
        assert!(parsed.game.is_none());
    }
}
