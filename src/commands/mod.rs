// commands/mod.rs - Command Module Registry
// Application commands the bot registers with Discord.

pub mod download;       // "Download media" message command
