use super::Timer;
use crate::{http::ServiceClient, output, transfer::TransferOptions, Context};
use anyhow::Context as _;
use camino::Utf8PathBuf;
use clap::Parser;
use serde_json::{json, Value};
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

/// Parses a duration given as whole seconds, or a number followed by one of
/// `s`, `m`, `h`, `d` or `w`
pub fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };

    let n: u64 = digits
        .parse()
        .map_err(|_err| format!("`{s}` must start with a whole number"))?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => return Err(format!("unknown unit `{other}`, expected one of s, m, h, d, w")),
    };

    match n.checked_mul(scale) {
        Some(0) => Err("the interval must be greater than zero".to_owned()),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Err(format!("`{s}` is too large")),
    }
}

pub fn parse_datetime(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|err| format!("`{s}` is not an RFC 3339 timestamp: {err}"))
}

fn rfc3339(dt: OffsetDateTime) -> anyhow::Result<String> {
    dt.format(&Rfc3339).context("failed to format timestamp")
}

/// When a recurring timer stops
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum End {
    Time(OffsetDateTime),
    Iterations(u32),
}

/// Builds the `schedule` object of a timer. Without an interval the timer
/// runs exactly once, at `start`
pub fn schedule(
    start: OffsetDateTime,
    interval: Option<Duration>,
    end: Option<End>,
) -> anyhow::Result<Value> {
    let start = rfc3339(start)?;

    let Some(interval) = interval else {
        anyhow::ensure!(end.is_none(), "a stop condition requires an --interval");
        return Ok(json!({ "type": "once", "datetime": start }));
    };

    let mut sched = json!({
        "type": "recurring",
        "interval_seconds": interval.as_secs(),
        "start": start,
    });

    match end {
        Some(End::Time(at)) => {
            sched["end"] = json!({ "condition": "time", "datetime": rfc3339(at)? });
        }
        Some(End::Iterations(count)) => {
            sched["end"] = json!({ "condition": "iterations", "count": count });
        }
        None => {}
    }

    Ok(sched)
}

#[derive(Parser, Debug)]
pub struct ScheduleOptions {
    /// A name for the timer
    #[arg(long)]
    name: Option<String>,
    /// Run repeatedly with this period, eg. 30m, 12h, 1w. Without it the
    /// timer runs once
    #[arg(long, value_parser = parse_interval)]
    interval: Option<Duration>,
    /// When the first run happens, defaults to now
    #[arg(long, value_parser = parse_datetime)]
    start: Option<OffsetDateTime>,
    /// Stop running after this time
    #[arg(long, value_parser = parse_datetime, requires = "interval")]
    stop_after_date: Option<OffsetDateTime>,
    /// Stop running after this many runs
    #[arg(
        long,
        requires = "interval",
        conflicts_with = "stop_after_date",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    stop_after_runs: Option<u32>,
}

impl ScheduleOptions {
    fn end(&self) -> Option<End> {
        match (self.stop_after_date, self.stop_after_runs) {
            (Some(at), _) => Some(End::Time(at)),
            (None, Some(count)) => Some(End::Iterations(count)),
            (None, None) => None,
        }
    }

    fn schedule(&self) -> anyhow::Result<Value> {
        let start = self.start.unwrap_or_else(OffsetDateTime::now_utc);
        schedule(start, self.interval, self.end())
    }
}

pub fn transfer_timer(
    transfer: &TransferOptions,
    sched: &ScheduleOptions,
) -> anyhow::Result<Value> {
    let name = sched
        .name
        .clone()
        .or_else(|| transfer.label.clone())
        .unwrap_or_else(|| "CLI Transfer Timer".to_owned());

    Ok(json!({
        "timer": {
            "timer_type": "transfer",
            "name": name,
            "schedule": sched.schedule()?,
            "body": transfer.document()?,
        }
    }))
}

pub fn flow_timer(flow_id: Uuid, input: Value, sched: &ScheduleOptions) -> anyhow::Result<Value> {
    let name = sched
        .name
        .clone()
        .unwrap_or_else(|| format!("CLI Flow Timer {flow_id}"));

    Ok(json!({
        "timer": {
            "timer_type": "flow",
            "flow_id": flow_id,
            "name": name,
            "schedule": sched.schedule()?,
            "body": { "body": input },
        }
    }))
}

/// POSTs a timer document directly, the typed endpoints only cover the
/// legacy job API
pub async fn submit(client: &ServiceClient, doc: &Value) -> anyhow::Result<Timer> {
    let res = client
        .request(reqwest::Method::POST, "/v2/timer")?
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(doc).context("failed to serialize timer")?)
        .send()
        .await
        .context("failed to send timer request")?;

    let code = res.status();
    let body = res.bytes().await.context("failed to read timer response")?;

    tracing::debug!(%code, len = body.len(), "timer creation response");

    if code.as_u16() >= 400 {
        match std::str::from_utf8(&body).map(str::trim) {
            Ok(err_str) if !err_str.is_empty() => anyhow::bail!("{code}: {err_str}"),
            _ => anyhow::bail!("failed to retrieve error for {code}"),
        }
    }

    #[derive(serde::Deserialize)]
    struct Created {
        timer: Timer,
    }

    let created: Created =
        serde_json::from_slice(&body).context("failed to deserialize created timer")?;
    Ok(created.timer)
}

#[derive(Parser)]
pub struct Transfer {
    #[clap(flatten)]
    transfer: TransferOptions,
    #[clap(flatten)]
    schedule: ScheduleOptions,
}

#[derive(Parser)]
pub struct Flow {
    flow_id: Uuid,
    /// The flow input, a JSON or YAML file, `-` reads stdin
    #[arg(long)]
    input: Utf8PathBuf,
    #[clap(flatten)]
    schedule: ScheduleOptions,
}

/// Creates a new timer
#[derive(clap::Subcommand)]
pub enum Args {
    /// A timer that submits a transfer task
    Transfer(Transfer),
    /// A timer that starts a flow run
    Flow(Flow),
}

pub async fn run(args: Args, client: &ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let doc = match args {
        Args::Transfer(t) => transfer_timer(&t.transfer, &t.schedule)?,
        Args::Flow(f) => {
            let input = crate::load_document(&f.input).context("failed to read flow input")?;
            flow_timer(f.flow_id, input, &f.schedule)?
        }
    };

    let timer = submit(client, &doc)
        .await
        .context("failed to create timer")?;
    output::print_record(ctx.format, &timer)
}
