use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const SHORT_MENU: &str = "• help - show help\n\
                          • time - current time\n\
                          • ping - check connectivity";

/// A bot command, recognized case-insensitively in English or Chinese.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Help,
    Time,
    Ping,
    Info,
    Unknown,
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hello" | "hi" | "你好" => Command::Hello,
            "help" | "帮助" => Command::Help,
            "time" | "时间" => Command::Time,
            "ping" => Command::Ping,
            "info" | "信息" => Command::Info,
            _ => Command::Unknown,
        }
    }
}

/// Maps command text to reply text. Every input gets exactly one reply.
pub struct CommandProcessor {
    timezone: Tz,
    started: Instant,
}

impl CommandProcessor {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            started: Instant::now(),
        }
    }

    pub fn process(&self, raw: &str, user_name: &str) -> String {
        self.reply_at(raw, user_name, Utc::now(), self.started.elapsed())
    }

    /// Same as [`process`](Self::process) with the clock and uptime supplied.
    pub fn reply_at(
        &self,
        raw: &str,
        user_name: &str,
        now: DateTime<Utc>,
        uptime: Duration,
    ) -> String {
        match Command::parse(raw) {
            Command::Hello => format!(
                "Hello {user_name}! I'm the Zoom chat bot 🤖\n\n\
                 Try one of these commands:\n\
                 {SHORT_MENU}\n\
                 • info - bot information"
            ),
            Command::Help => "🤖 **Zoom Chat Bot Help**\n\n\
                 **Commands:**\n\
                 • hello/hi/你好 - greet the bot\n\
                 • help/帮助 - show this help\n\
                 • time/时间 - show the current time\n\
                 • ping - check the bot's status\n\
                 • info/信息 - show version information\n\n\
                 **Usage:**\n\
                 Send a command and the bot replies automatically."
                .to_string(),
            Command::Time => format!(
                "🕐 **Current time**\n{}",
                now.with_timezone(&self.timezone)
                    .format("%Y-%m-%d %H:%M:%S %Z")
            ),
            Command::Ping => format!(
                "🏓 **Pong!**\n\n\
                 Status: ✅ running\n\
                 Response time: < 100ms\n\
                 Server time: {}",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            Command::Info => format!(
                "🤖 **Bot info**\n\n\
                 **Version:** {VERSION}\n\
                 **Status:** 🟢 online\n\
                 **Features:** chat, command handling\n\
                 **Languages:** Chinese/English\n\
                 **Uptime:** {} seconds",
                uptime.as_secs()
            ),
            Command::Unknown => format!(
                "I received your message: \"{raw}\"\n\n\
                 🤖 I'm a chat bot, try sending:\n\
                 {SHORT_MENU}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn processor() -> CommandProcessor {
        CommandProcessor::new(chrono_tz::Asia::Shanghai)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 4, 5, 6).unwrap()
    }

    fn reply(raw: &str) -> String {
        processor().reply_at(raw, "Alice", fixed_now(), Duration::from_secs(42))
    }

    #[test]
    fn test_aliases() {
        for raw in ["hello", "hi", "你好"] {
            assert_eq!(Command::parse(raw), Command::Hello);
        }
        for raw in ["help", "帮助"] {
            assert_eq!(Command::parse(raw), Command::Help);
        }
        for raw in ["time", "时间"] {
            assert_eq!(Command::parse(raw), Command::Time);
        }
        assert_eq!(Command::parse("ping"), Command::Ping);
        for raw in ["info", "信息"] {
            assert_eq!(Command::parse(raw), Command::Info);
        }
        assert_eq!(Command::parse("hello there"), Command::Unknown);
    }

    #[test]
    fn test_case_and_whitespace_invariance() {
        assert_eq!(reply("  HELLO  "), reply("hello"));
        assert_eq!(reply("\tPing\n"), reply("ping"));
        assert_eq!(reply(" 你好 "), reply("hello"));
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        for raw in ["hello", "help", "time", "ping", "info", "whatever"] {
            assert_eq!(reply(raw), reply(raw));
        }
    }

    #[test]
    fn test_hello_greets_by_name_with_menu() {
        let out = reply("hi");
        assert!(out.starts_with("Hello Alice!"));
        for cmd in ["help", "time", "ping", "info"] {
            assert!(out.contains(&format!("• {cmd} -")), "menu missing {cmd}");
        }
    }

    #[test]
    fn test_help_lists_all_commands() {
        let out = reply("帮助");
        assert!(out.contains("hello/hi/你好"));
        assert!(out.contains("info/信息"));
    }

    #[test]
    fn test_time_uses_configured_zone() {
        assert_eq!(reply("time"), "🕐 **Current time**\n2024-03-01 12:05:06 CST");

        let utc = CommandProcessor::new(chrono_tz::UTC);
        let out = utc.reply_at("时间", "x", fixed_now(), Duration::ZERO);
        assert!(out.ends_with("2024-03-01 04:05:06 UTC"));
    }

    #[test]
    fn test_ping_includes_utc_timestamp() {
        let out = reply("ping");
        assert!(out.starts_with("🏓 **Pong!**"));
        assert!(out.ends_with("Server time: 2024-03-01T04:05:06.000Z"));
    }

    #[test]
    fn test_info_reports_version_and_uptime() {
        let out = reply("INFO");
        assert!(out.contains(VERSION));
        assert!(out.ends_with("**Uptime:** 42 seconds"));
    }

    #[test]
    fn test_unknown_echoes_raw_input_and_menu() {
        for raw in ["  What's up?  ", "", "HELP ME", "🤖"] {
            let out = reply(raw);
            assert!(out.contains(&format!("\"{raw}\"")));
            assert!(out.contains(SHORT_MENU));
        }
    }

    #[test]
    fn test_every_reply_non_empty() {
        for raw in ["", " ", "hello", "time", "ping", "info", "help", "x"] {
            assert!(!processor().process(raw, "").is_empty());
        }
    }
}
