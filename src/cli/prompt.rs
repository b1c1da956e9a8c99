use chrono::{Local, NaiveDate, NaiveTime};
use console::{style, Term};

use crate::extract::ExtractRequest;
use crate::schedule::{parse_date, parse_hours, parse_start_time};
use crate::{ExtractorError, Result};

const DEFAULT_START_TIME: &str = "0000";
const DEFAULT_HOURS: &str = "12";

/// Fill in whatever the command line left out by asking on the terminal
pub fn complete_request(
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    hours: Option<u32>,
) -> Result<ExtractRequest> {
    if let (Some(date), Some(start_time), Some(hours)) = (date, start_time, hours) {
        return Ok(ExtractRequest {
            date,
            start_time,
            hours,
        });
    }

    let term = Term::stdout();
    term.write_line(
        &style("What period do you want to download and extract?")
            .white()
            .on_magenta()
            .bold()
            .to_string(),
    )?;

    let today = Local::now().format("%y%m%d").to_string();
    let date = match date {
        Some(date) => date,
        None => ask(&term, "Date (YYMMDD)", &today, parse_date)?,
    };
    let start_time = match start_time {
        Some(start_time) => start_time,
        None => ask(&term, "Start time (HHMM)", DEFAULT_START_TIME, parse_start_time)?,
    };
    let hours = match hours {
        Some(hours) => hours,
        None => ask(&term, "How many hours forward?", DEFAULT_HOURS, parse_hours)?,
    };

    Ok(ExtractRequest {
        date,
        start_time,
        hours,
    })
}

/// Ask until the answer parses; an empty answer takes the default
fn ask<T>(
    term: &Term,
    question: &str,
    default: &str,
    parse: fn(&str) -> std::result::Result<T, ExtractorError>,
) -> Result<T> {
    loop {
        term.write_str(&format!(
            "{} {} {} ",
            style("?").green().bold(),
            style(question).bold(),
            style(format!("({})", default)).dim()
        ))?;

        let line = term.read_line()?;
        let answer = match line.trim() {
            "" => default,
            answer => answer,
        };

        match parse(answer) {
            Ok(value) => return Ok(value),
            Err(e) => term.write_line(&style(format!(">> {}", e)).red().to_string())?,
        }
    }
}
