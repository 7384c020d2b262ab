use anyhow::Result;
use clap::Args;

use campus_connect::{ClientConfig, Relation, Suggestion, derive_mine, suggest};

use crate::{
    commands::{connect, signed_in},
    examples::ExampleGroup,
    output::{EventRow, EventRows, OutputManager, SocietyRow, SocietyRows},
    theme::ICONS,
};

pub const EVENT_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Browsing events",
    commands: &[
        "campus-connect events                                # All events by time",
        "campus-connect events --user ada@connect.hku.hk      # Plus Ada's events",
        "campus-connect --output json events                  # Machine-readable",
    ],
}];

pub const SOCIETY_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Browsing societies",
    commands: &[
        "campus-connect societies                             # All societies by name",
        "campus-connect societies --user ada@connect.hku.hk   # Plus Ada's societies",
    ],
}];

pub const SUGGEST_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Discovery",
    commands: &["campus-connect suggest                               # One random event or society"],
}];

#[derive(Args)]
pub struct ListArgs {
    /// Also show the items this user has joined
    #[arg(long)]
    pub user: Option<String>,
}

pub async fn handle_events(args: ListArgs, config: &ClientConfig, output: &OutputManager) -> Result<()> {
    let client = connect(config).await?;
    let events = client.events().loaded().await?;

    output.heading("All events");
    output.display(&EventRows(events.items.iter().map(EventRow::from).collect()))?;

    if let Some(user) = args.user {
        let state = signed_in(&client, &user).await?;
        let mine = derive_mine(&events.items, state.relation_set(Relation::Events));
        output.heading(&format!("Events joined by {user}"));
        output.display(&EventRows(mine.iter().map(EventRow::from).collect()))?;
    }

    client.shutdown();
    Ok(())
}

pub async fn handle_societies(args: ListArgs, config: &ClientConfig, output: &OutputManager) -> Result<()> {
    let client = connect(config).await?;
    let societies = client.societies().loaded().await?;

    output.heading("All societies");
    output.display(&SocietyRows(societies.items.iter().map(SocietyRow::from).collect()))?;

    if let Some(user) = args.user {
        let state = signed_in(&client, &user).await?;
        let mine = derive_mine(&societies.items, state.relation_set(Relation::Societies));
        output.heading(&format!("Societies joined by {user}"));
        output.display(&SocietyRows(mine.iter().map(SocietyRow::from).collect()))?;
    }

    client.shutdown();
    Ok(())
}

pub async fn handle_suggest(config: &ClientConfig, output: &OutputManager) -> Result<()> {
    let client = connect(config).await?;
    let events = client.events().loaded().await?;
    let societies = client.societies().loaded().await?;

    match suggest(&events.items, &societies.items, &mut rand::thread_rng()) {
        Some(Suggestion::Event(listing)) => {
            output.info(&format!("How about this event: {}", listing.event.name));
            let row = EventRow::from(&listing);
            output.indented(ICONS.arrow, &format!("{} at {}", row.time, row.location));
            if let Some(society) = &row.society {
                output.indented(ICONS.arrow, &format!("hosted by {society}"));
            }
        }
        Some(Suggestion::Society(society)) => {
            output.info(&format!("How about this society: {}", society.name));
            output.indented(ICONS.arrow, &society.description);
        }
        None => output.warning("Nothing to suggest yet"),
    }

    client.shutdown();
    Ok(())
}
