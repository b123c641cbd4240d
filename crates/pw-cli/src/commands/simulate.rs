//! Simulate command: runs both engines against an in-memory page.
//!
//! Volume and allow-list come from the real database, so a simulation
//! behaves like a visit to that URL. It starts at the stored volume, persists
//! user changes, and closes its tab after the configured idle threshold
//! unless the page is allow-listed or `--activity-every-ms` keeps the
//! simulated user busy.

use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pw_core::sim::{SimBrowser, SimElement, SimPage};
use pw_core::{
    ActivityKind, ElementId, IdleTrigger, MediaElement, Page, TabId, TickOutcome,
    VolumeSynchronizer, origin_of,
};
use pw_db::Database;
use tokio::task::LocalSet;
use tokio::time::Instant;
use tracing::info;

use super::runtime;
use crate::{Config, SimulateArgs};

const SIMULATED_TAB: TabId = 1;

/// How long after the bootstrap phase the simulated user touches the volume.
const USER_DELAY_MARGIN: Duration = Duration::from_millis(50);

pub fn run<W: Write>(
    writer: &mut W,
    db: Rc<Database>,
    config: &Config,
    args: &SimulateArgs,
) -> Result<()> {
    if let Some(volume) = args.user_volume {
        if !(0.0..=1.0).contains(&volume) {
            bail!("volume must be between 0.0 and 1.0, got {volume}");
        }
    }
    if args.activity_every_ms == Some(0) {
        bail!("activity interval must be positive");
    }
    let origin = origin_of(&args.url)
        .with_context(|| format!("not a valid page URL: {}", args.url))?;

    let runtime = runtime()?;
    let report = LocalSet::new().block_on(&runtime, simulate(db, origin, config, args));
    report.write(writer)
}

/// What the page looked like when the simulation ended.
#[derive(Debug)]
struct Report {
    url: String,
    duration: Duration,
    volume: f64,
    media: Vec<(ElementId, f64)>,
    tracked: usize,
    outcomes: Vec<TickOutcome>,
    closed_tabs: Vec<TabId>,
}

impl Report {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(
            writer,
            "Simulated {} for {}s",
            self.url,
            self.duration.as_secs()
        )?;
        writeln!(writer, "Volume: {}", self.volume)?;
        writeln!(
            writer,
            "Media elements: {} (tracked: {})",
            self.media.len(),
            self.tracked
        )?;
        for (id, volume) in &self.media {
            writeln!(writer, "- #{id}: {volume}")?;
        }

        let idle = self
            .outcomes
            .iter()
            .filter(|o| **o != TickOutcome::Active)
            .count();
        let excluded = self
            .outcomes
            .iter()
            .filter(|o| **o == TickOutcome::Excluded)
            .count();
        writeln!(
            writer,
            "Idle ticks: {idle} (excluded: {excluded}, terminate attempts: {})",
            idle - excluded
        )?;

        let state = if self.closed_tabs.contains(&SIMULATED_TAB) {
            "closed"
        } else {
            "open"
        };
        writeln!(writer, "Tab {SIMULATED_TAB}: {state}")?;
        Ok(())
    }
}

async fn simulate(
    db: Rc<Database>,
    origin: String,
    config: &Config,
    args: &SimulateArgs,
) -> Report {
    let volume_settings = config.volume_settings();
    let duration = Duration::from_secs(args.duration_secs);

    let (page, events) = SimPage::new(args.url.clone());
    let initial: Vec<SimElement> = (0..args.media)
        .map(|_| page.add_media(page.body(), "video"))
        .collect();

    let sync =
        VolumeSynchronizer::initialize(page.clone(), db.origin_storage(origin), volume_settings);
    tokio::task::spawn_local(Rc::clone(&sync).run(events));

    let browser = SimBrowser::with_active_tab(SIMULATED_TAB);
    let trigger = IdleTrigger::new(
        page.clone(),
        Rc::clone(&db),
        browser.clone(),
        config.idle_settings(),
    );
    trigger.observe(&page);

    let start = Instant::now();
    let user = async {
        let (Some(volume), Some(first)) = (args.user_volume, initial.first()) else {
            return;
        };
        tokio::time::sleep_until(start + volume_settings.settle_delay + USER_DELAY_MARGIN).await;
        info!(volume, "simulated user changes volume");
        first.set_volume(volume);
    };
    let late = async {
        if args.late_media == 0 {
            return;
        }
        tokio::time::sleep_until(start + duration / 2).await;
        let container = page.create_element("div");
        for _ in 0..args.late_media {
            let node = page.create_element("video");
            page.append_child(container, node);
        }
        info!(count = args.late_media, "simulated page inserts media");
        page.append_child(page.body(), container);
    };
    let activity = async {
        let Some(every) = args.activity_every_ms else {
            return;
        };
        let every = Duration::from_millis(every);
        for kind in ActivityKind::ALL.into_iter().cycle() {
            tokio::time::sleep(every).await;
            page.interact(kind);
        }
    };
    let script = async {
        tokio::join!(user, late, activity);
        std::future::pending::<()>().await;
    };

    let mut outcomes = Vec::new();
    tokio::select! {
        () = trigger.run_with(|outcome| outcomes.push(outcome)) => {}
        () = script => {}
        () = tokio::time::sleep(duration) => {}
    }
    // Let the synchronizer handle anything still queued.
    tokio::task::yield_now().await;

    Report {
        url: args.url.clone(),
        duration,
        volume: sync.volume(),
        media: page
            .media_elements()
            .iter()
            .map(|element| (element.id(), element.volume()))
            .collect(),
        tracked: sync.tracked_count(),
        outcomes,
        closed_tabs: browser.closed_tabs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn fast_config() -> Config {
        Config {
            settle_delay_ms: 20,
            reapply_interval_ms: 20,
            idle_threshold_secs: 1,
            poll_interval_ms: 50,
            ..Config::default()
        }
    }

    fn args(url: &str) -> SimulateArgs {
        SimulateArgs {
            url: url.to_string(),
            media: 2,
            late_media: 1,
            user_volume: Some(0.4),
            activity_every_ms: None,
            duration_secs: 2,
        }
    }

    fn simulate_output(db: &Rc<Database>, args: &SimulateArgs) -> String {
        let mut out = Vec::new();
        run(&mut out, Rc::clone(db), &fast_config(), args).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn unlisted_page_volume_syncs_and_tab_closes() {
        let db = Rc::new(Database::open_in_memory().unwrap());

        let out = simulate_output(&db, &args("https://video.test/watch"));

        assert!(out.contains("Volume: 0.4\n"), "{out}");
        assert!(out.contains("Media elements: 3 (tracked: 3)\n"), "{out}");
        assert!(out.contains("- #1: 0.4\n- #2: 0.4\n- #4: 0.4\n"), "{out}");
        assert!(out.ends_with("Tab 1: closed\n"), "{out}");
        assert_eq!(
            db.local_get("https://video.test", pw_core::VOLUME_KEY)
                .unwrap()
                .as_deref(),
            Some("0.4")
        );
    }

    #[test]
    fn listed_page_keeps_its_tab() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        db.set_url_patterns(&["https://video.test".to_string()])
            .unwrap();

        let out = simulate_output(&db, &args("https://video.test/watch"));

        assert!(out.contains("terminate attempts: 0)"), "{out}");
        assert!(!out.contains("excluded: 0,"), "{out}");
        assert!(out.ends_with("Tab 1: open\n"), "{out}");
    }

    #[test]
    fn busy_user_keeps_an_unlisted_tab_open() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let mut args = args("https://video.test/watch");
        args.activity_every_ms = Some(200);

        let out = simulate_output(&db, &args);

        assert!(out.contains("Idle ticks: 0 "), "{out}");
        assert!(out.ends_with("Tab 1: open\n"), "{out}");
    }

    #[test]
    fn report_format() {
        let report = Report {
            url: "https://video.test/".to_string(),
            duration: Duration::from_secs(3),
            volume: 0.5,
            media: vec![(1, 0.5), (2, 0.5)],
            tracked: 2,
            outcomes: vec![
                TickOutcome::Active,
                TickOutcome::Excluded,
                TickOutcome::Terminated(1),
                TickOutcome::NoActiveTab,
            ],
            closed_tabs: vec![1],
        };
        let mut out = Vec::new();
        report.write(&mut out).unwrap();

        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Simulated https://video.test/ for 3s
        Volume: 0.5
        Media elements: 2 (tracked: 2)
        - #1: 0.5
        - #2: 0.5
        Idle ticks: 3 (excluded: 1, terminate attempts: 2)
        Tab 1: closed
        ");
    }

    #[test]
    fn rejects_out_of_range_user_volume() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let mut args = args("https://video.test/");
        args.user_volume = Some(2.0);

        let mut out = Vec::new();
        assert!(run(&mut out, db, &fast_config(), &args).is_err());
    }

    #[test]
    fn rejects_zero_activity_interval() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let mut args = args("https://video.test/");
        args.activity_every_ms = Some(0);

        let mut out = Vec::new();
        assert!(run(&mut out, db, &fast_config(), &args).is_err());
    }
}
