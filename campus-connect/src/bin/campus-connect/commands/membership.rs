use anyhow::{Result, bail};
use clap::{Args, ValueEnum};

use campus_connect::{ClientConfig, MembershipChange, Relation};

use crate::{
    commands::{connect, signed_in},
    examples::ExampleGroup,
    output::OutputManager,
    theme::ICONS,
};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Membership",
        commands: &[
            "campus-connect join event E2 --user ada@connect.hku.hk     # Join and schedule a reminder",
            "campus-connect leave society chess --user ada@connect.hku.hk",
        ],
    },
    ExampleGroup {
        title: "Live views",
        commands: &["campus-connect watch --user ada@connect.hku.hk      # Stream 'my events' until Ctrl+C"],
    },
];

#[derive(Clone, Copy, ValueEnum)]
pub enum TargetKind {
    Event,
    Society,
}

impl From<TargetKind> for Relation {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Event => Relation::Events,
            TargetKind::Society => Relation::Societies,
        }
    }
}

#[derive(Args)]
pub struct MembershipArgs {
    pub kind: TargetKind,

    pub id: String,

    /// Email of the member
    #[arg(long)]
    pub user: String,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Email of the member
    #[arg(long)]
    pub user: String,
}

/// Joins (`join = true`) or leaves through the reconciler's toggle, unless already in that state.
pub async fn handle_membership(
    args: MembershipArgs,
    join: bool,
    config: &ClientConfig,
    output: &OutputManager,
) -> Result<()> {
    let relation = Relation::from(args.kind);
    let client = connect(config).await?;
    client.events().loaded().await?;
    let state = signed_in(&client, &args.user).await?;

    if state.is_member(relation, &args.id)? == join {
        let already = if join { "already joined" } else { "not a member of" };
        output.info(&format!("{} {already} {relation} {}", args.user, args.id));
        client.shutdown();
        return Ok(());
    }

    let reconciler = client.reconciler();
    let change = match relation {
        Relation::Events => reconciler.toggle_event_membership(&args.id).await?,
        Relation::Societies => reconciler.toggle_society_membership(&args.id).await?,
    };
    match change {
        MembershipChange::Joined => output.success(&format!("{} joined {relation} {}", args.user, args.id)),
        MembershipChange::Left => output.success(&format!("{} left {relation} {}", args.user, args.id)),
    }

    client.shutdown();
    Ok(())
}

pub async fn handle_watch(args: WatchArgs, config: &ClientConfig, output: &OutputManager) -> Result<()> {
    let client = connect(config).await?;
    signed_in(&client, &args.user).await?;
    let mut my_events = client.reconciler().my_events();
    let mut my_societies = client.reconciler().my_societies();
    output.info(&format!("Watching memberships of {} (Ctrl+C to stop)", args.user));

    let mut shown_events: Vec<String> = Vec::new();
    let mut shown_societies: Vec<String> = Vec::new();
    loop {
        let events: Vec<String> = my_events
            .borrow_and_update()
            .iter()
            .map(|listing| format!("{} {}", listing.event.time.format("%Y-%m-%d %H:%M"), listing.event.name))
            .collect();
        let societies: Vec<String> = my_societies
            .borrow_and_update()
            .iter()
            .map(|society| society.name.clone())
            .collect();
        report_changes(output, "event", &shown_events, &events);
        report_changes(output, "society", &shown_societies, &societies);
        shown_events = events;
        shown_societies = societies;

        tokio::select! {
            changed = my_events.changed() => if changed.is_err() { bail!("Event view stopped") },
            changed = my_societies.changed() => if changed.is_err() { bail!("Society view stopped") },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown();
    Ok(())
}

fn report_changes(output: &OutputManager, label: &str, before: &[String], after: &[String]) {
    for item in after.iter().filter(|item| !before.contains(item)) {
        output.indented(ICONS.joined, &format!("{label}: {item}"));
    }
    for item in before.iter().filter(|item| !after.contains(item)) {
        output.indented(ICONS.left, &format!("{label}: {item}"));
    }
}
