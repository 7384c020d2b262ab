use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use campus_connect::{
    ClientConfig, DocumentSnapshot, DocumentStore, RedisStore,
    id::generate_document_id,
    model::{Category, Event, Merchandise, Post, Record, Society, User, decode_record, encode_record},
    store::Document,
};

use crate::{examples::ExampleGroup, output::{OutputManager, SeedSummary}};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Seeding",
    commands: &[
        "campus-connect seed fixtures/sample.json           # Load sample data",
        "campus-connect seed fixtures/sample.json --clear   # Wipe the prefix first",
    ],
}];

#[derive(Args)]
pub struct SeedArgs {
    /// JSON file with one array of documents per collection
    pub file: PathBuf,

    /// Delete every key under the configured prefix before loading
    #[arg(long)]
    pub clear: bool,
}

#[derive(Deserialize, Default)]
struct SeedFile {
    #[serde(default)]
    users: Vec<Document>,
    #[serde(default)]
    societies: Vec<Document>,
    #[serde(default)]
    events: Vec<Document>,
    #[serde(default)]
    categories: Vec<Document>,
    #[serde(default)]
    merch: Vec<Document>,
    #[serde(default)]
    posts: Vec<Document>,
}

pub async fn handle_seed(args: SeedArgs, config: &ClientConfig, output: &OutputManager) -> Result<()> {
    let content =
        std::fs::read_to_string(&args.file).with_context(|| format!("Failed to read {}", args.file.display()))?;
    let seed: SeedFile =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let store = RedisStore::connect(&config.redis.url, config.redis.prefix.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis.url))?;
    if args.clear {
        let deleted = store.clear().await?;
        output.info(&format!("Deleted {deleted} keys under '{}'", store.prefix()));
    }

    let summary = SeedSummary(vec![
        (Category::COLLECTION.to_string(), seed_collection::<Category>(&store, seed.categories).await?),
        (Society::COLLECTION.to_string(), seed_collection::<Society>(&store, seed.societies).await?),
        (Event::COLLECTION.to_string(), seed_collection::<Event>(&store, seed.events).await?),
        (Merchandise::COLLECTION.to_string(), seed_collection::<Merchandise>(&store, seed.merch).await?),
        (Post::COLLECTION.to_string(), seed_collection::<Post>(&store, seed.posts).await?),
        (User::COLLECTION.to_string(), seed_collection::<User>(&store, seed.users).await?),
    ]);
    output.display(&summary)?;
    output.success("Seed complete");
    Ok(())
}

/// Writes each document under its `id` (or a generated one), after passing it through the typed record.
async fn seed_collection<T: Record>(store: &RedisStore, docs: Vec<Document>) -> Result<usize> {
    let count = docs.len();
    for mut doc in docs {
        let id = match doc.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => generate_document_id(),
        };
        let record: T = decode_record(&DocumentSnapshot::new(id.clone(), doc))
            .with_context(|| format!("Invalid seed document {}/{id}", T::COLLECTION))?;
        store.set_document(T::COLLECTION, &id, encode_record(&record)?).await?;
    }
    Ok(count)
}
