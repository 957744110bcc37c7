use crate::models::Game;
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

// ── Daily schedule grid ───────────────────────────────────────────────────────

/// The schedule grid keeps its ASP.NET control id across site revisions;
/// plain tables are the fallback for archived snapshots.
const GRID_CANDIDATES: [&str; 2] = ["table#ctl00_ContentPlaceHolder1_gvGames", "table"];

/// Parse the daily schedule page for `date` into game rows.
///
/// Row layout: Date | Time | Home | Away | Field | League. Header rows and
/// rows whose date cell does not parse are skipped.
pub fn parse_schedule_page(html: &str, date: NaiveDate, scraped_at: NaiveDateTime) -> Result<Vec<Game>> {
    let doc = Html::parse_document(html);

    let tr_sel = Selector::parse("tr")
        .map_err(|e| anyhow::anyhow!("tr selector: {:?}", e))?;
    let th_sel = Selector::parse("th")
        .map_err(|e| anyhow::anyhow!("th selector: {:?}", e))?;
    let td_sel = Selector::parse("td")
        .map_err(|e| anyhow::anyhow!("td selector: {:?}", e))?;

    let Some(table) = find_grid(&doc) else {
        warn!("{}: no schedule grid found on page", date);
        return Ok(vec![]);
    };

    let mut games = Vec::new();

    for tr in table.select(&tr_sel) {
        if tr.select(&th_sel).next().is_some() {
            continue; // header row
        }

        let cells: Vec<String> = tr
            .select(&td_sel)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < 6 {
            continue;
        }

        let Some(game_date) = parse_grid_date(&cells[0]) else {
            warn!("{}: unparsable date cell {:?}, skipping row", date, cells[0]);
            continue;
        };

        games.push(Game {
            date: game_date,
            time: cells[1].clone(),
            home_team: cells[2].clone(),
            away_team: cells[3].clone(),
            field: non_empty(&cells[4]),
            league_name: non_empty(&cells[5]),
            scraped_at,
        });
    }

    Ok(games)
}

fn find_grid(doc: &Html) -> Option<ElementRef<'_>> {
    for selector_str in &GRID_CANDIDATES {
        let Ok(sel) = Selector::parse(selector_str) else { continue };
        if let Some(table) = doc.select(&sel).next() {
            return Some(table);
        }
    }
    None
}

/// Grid dates come as MM/DD/YYYY; archived snapshots occasionally carry ISO.
fn parse_grid_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%Y-%m-%d"))
        .ok()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PAGE: &str = r#"
    <html><body>
    <table id="ctl00_ContentPlaceHolder1_gvGames">
      <tr><th>Date</th><th>Time</th><th>Home</th><th>Away</th><th>Field</th><th>League</th></tr>
      <tr><td>03/01/2024</td><td>06:00 PM</td><td>Strikers</td><td>Rovers</td><td>Field 2</td><td>Adult Coed</td></tr>
      <tr><td>03/01/2024</td><td>07:15 PM</td><td>United</td><td>Dynamo</td><td></td><td>Open D1</td></tr>
      <tr><td>bad-date</td><td>08:00 PM</td><td>A</td><td>B</td><td>F</td><td>L</td></tr>
      <tr><td>03/01/2024</td><td>too few cells</td></tr>
    </table>
    </body></html>"#;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parses_grid_rows() {
        let games = parse_schedule_page(PAGE, d("2024-03-01"), Utc::now().naive_utc()).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].home_team, "Strikers");
        assert_eq!(games[0].away_team, "Rovers");
        assert_eq!(games[0].date, d("2024-03-01"));
        assert_eq!(games[0].field.as_deref(), Some("Field 2"));
        assert_eq!(games[1].field, None);
        assert_eq!(games[1].league_name.as_deref(), Some("Open D1"));
    }

    #[test]
    fn empty_page_yields_no_games() {
        let games =
            parse_schedule_page("<html><body>No games</body></html>", d("2024-03-01"), Utc::now().naive_utc())
                .unwrap();
        assert!(games.is_empty());
    }

    #[test]
    fn falls_back_to_plain_table() {
        let page = PAGE.replace(r#" id="ctl00_ContentPlaceHolder1_gvGames""#, "");
        let games = parse_schedule_page(&page, d("2024-03-01"), Utc::now().naive_utc()).unwrap();
        assert_eq!(games.len(), 2);
    }

    #[test]
    fn accepts_iso_date_cells() {
        assert_eq!(parse_grid_date("2024-03-01"), Some(d("2024-03-01")));
        assert_eq!(parse_grid_date("03/01/2024"), Some(d("2024-03-01")));
        assert_eq!(parse_grid_date("garbage"), None);
    }
}
