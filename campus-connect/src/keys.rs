/// Key layout used by the Redis-backed document store.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    /// JSON body of a single document.
    pub fn document(&self, collection: &str, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, collection, id)
    }

    /// Set of every document id in a collection.
    pub fn index(&self, collection: &str) -> String {
        format!("{}:idx:{}", self.prefix, collection)
    }

    /// Pub/sub channel announcing changed document ids of a collection.
    pub fn changes(&self, collection: &str) -> String {
        format!("{}:changes:{}", self.prefix, collection)
    }
}
