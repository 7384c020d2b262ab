use crate::commands::{browse, membership, qr, seed};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "seed",
            groups: seed::EXAMPLES,
        },
        CommandExample {
            name: "events",
            groups: browse::EVENT_EXAMPLES,
        },
        CommandExample {
            name: "societies",
            groups: browse::SOCIETY_EXAMPLES,
        },
        CommandExample {
            name: "suggest",
            groups: browse::SUGGEST_EXAMPLES,
        },
        CommandExample {
            name: "join",
            groups: membership::EXAMPLES,
        },
        CommandExample {
            name: "leave",
            groups: membership::EXAMPLES,
        },
        CommandExample {
            name: "watch",
            groups: membership::EXAMPLES,
        },
        CommandExample {
            name: "qr",
            groups: qr::EXAMPLES,
        },
    ]
}
