//! Bounded navigation helpers
//!
//! The session never retries on its own. These helpers do, with a fixed
//! number of attempts, and report how they ended instead of looping.

use super::keys::Key;
use super::screen::Screen;
use super::session::{Session, SessionError};

/// Function key that backs out of the current screen
const EXIT_KEY: u8 = 3;
/// Function key that opens the prompt list for the current field
const PROMPT_KEY: u8 = 4;

/// Default attempt budget for [`return_to_main_menu`]
pub const DEFAULT_MENU_ATTEMPTS: u32 = 5;

/// How a navigation attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Target reached after this many key presses
    Reached {
        /// Key presses used
        attempts: u32,
    },
    /// The host reported errors; navigation stopped
    Blocked {
        /// Error lines on the screen
        errors: Vec<String>,
    },
    /// Attempt budget exhausted
    GaveUp {
        /// Key presses used
        attempts: u32,
    },
}

impl NavigationOutcome {
    /// Whether the target screen was reached
    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }
}

/// Press F3 until the main menu shows, at most `max_attempts` times.
///
/// Stops early when the screen shows errors.
pub async fn return_to_main_menu(
    session: &mut Session,
    screen: &mut Screen,
    max_attempts: u32,
) -> Result<NavigationOutcome, SessionError> {
    tracing::info!("Returning to main menu");

    let mut attempts = 0;
    while !screen.is_main_menu() && attempts < max_attempts {
        screen.press_function_key(session, EXIT_KEY).await?;
        attempts += 1;

        if screen.is_main_menu() {
            break;
        }
        if screen.has_errors() {
            let errors = screen.error_messages();
            tracing::warn!("Error detected while returning to main menu: {:?}", errors);
            return Ok(NavigationOutcome::Blocked { errors });
        }
        tracing::warn!("Attempt {}/{}: main menu not reached", attempts, max_attempts);
    }

    if screen.is_main_menu() {
        tracing::info!("Returned to main menu after {} attempts", attempts);
        Ok(NavigationOutcome::Reached { attempts })
    } else {
        tracing::warn!("Could not return to main menu after {} attempts", attempts);
        Ok(NavigationOutcome::GaveUp { attempts })
    }
}

/// Open the prompt list with F4 and pick `value` from it.
///
/// Returns `false`, leaving the screen as F4 left it, when no selection list
/// appeared.
pub async fn select_from_prompt(
    session: &mut Session,
    screen: &mut Screen,
    value: &str,
) -> Result<bool, SessionError> {
    tracing::debug!("Selecting {:?} from prompt list", value);

    screen.press_function_key(session, PROMPT_KEY).await?;
    if !screen.is_selection_list() {
        tracing::warn!("F4 did not open a selection list");
        return Ok(false);
    }

    session.send_text(value).await?;
    screen.press_key(session, Key::Enter).await?;
    Ok(true)
}

/// Type each non-blank value into the field with the matching label.
///
/// Fails on the first label that is not on the screen.
pub async fn fill_form(
    session: &mut Session,
    screen: &mut Screen,
    values: &[(&str, &str)],
) -> Result<usize, SessionError> {
    tracing::info!("Filling form with {} fields", values.len());

    let mut filled = 0;
    for (label, value) in values {
        if value.trim().is_empty() {
            continue;
        }
        screen.set_field_value(session, *label, value).await?;
        filled += 1;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::TimingConfig;
    use crate::core::transport::VirtualHost;

    const F3: &str = "\u{1b}[13~";
    const F4: &str = "\u{1b}[14~";

    async fn start(host: &VirtualHost, first: &str) -> (Session, Screen) {
        host.push_frame(first);
        let mut session =
            Session::with_transport("nav", Box::new(host.transport()), TimingConfig::default());
        session.connect().await.unwrap();
        let screen = Screen::capture(&mut session).await.unwrap();
        (session, screen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_on_main_menu() {
        let host = VirtualHost::new();
        let (mut session, mut screen) = start(&host, "MAIN MENU").await;

        let outcome = return_to_main_menu(&mut session, &mut screen, 5).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Reached { attempts: 0 });
        assert!(host.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_main_menu() {
        let host = VirtualHost::new();
        host.respond_to(F3, "MAIN MENU");
        let (mut session, mut screen) = start(&host, "NEW CONTRACT").await;

        let outcome = return_to_main_menu(&mut session, &mut screen, 5).await.unwrap();
        assert!(outcome.is_reached());
        assert_eq!(outcome, NavigationOutcome::Reached { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let host = VirtualHost::new();
        let (mut session, mut screen) = start(&host, "WORK WITH SPOOLED FILES").await;

        let outcome = return_to_main_menu(&mut session, &mut screen, 3).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::GaveUp { attempts: 3 });
        assert_eq!(host.written_text(), F3.repeat(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_by_errors() {
        let host = VirtualHost::new();
        host.respond_to(F3, "NEW CONTRACT\n Error: contract not saved\n");
        let (mut session, mut screen) = start(&host, "NEW CONTRACT").await;

        let outcome = return_to_main_menu(&mut session, &mut screen, 5).await.unwrap();
        assert_eq!(
            outcome,
            NavigationOutcome::Blocked {
                errors: vec!["Error: contract not saved".to_string()]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_from_prompt() {
        let host = VirtualHost::new();
        host.respond_to(F4, "Select one of the following:\n  M  Monthly\n  Y  Yearly\n");
        host.respond_to("Y\r\n", "NEW CONTRACT\nBilling Freq: Y_");
        let (mut session, mut screen) = start(&host, "NEW CONTRACT\nBilling Freq: __").await;

        assert!(select_from_prompt(&mut session, &mut screen, "Y").await.unwrap());
        assert_eq!(host.written_text(), format!("{F4}Y\r\n\r\n"));
        assert!(screen.contains_text("Billing Freq: Y_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_without_list() {
        let host = VirtualHost::new();
        let (mut session, mut screen) = start(&host, "NEW CONTRACT").await;

        assert!(!select_from_prompt(&mut session, &mut screen, "Y").await.unwrap());
        assert_eq!(host.written_text(), F4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_form_skips_blank_values() {
        let host = VirtualHost::new();
        let (mut session, mut screen) = start(
            &host,
            "NEW CONTRACT\nLast Name  : ____________________\nFirst Name : ____________________\n",
        )
        .await;

        let filled = fill_form(
            &mut session,
            &mut screen,
            &[("Last Name", "SMITH"), ("First Name", "  ")],
        )
        .await
        .unwrap();
        assert_eq!(filled, 1);
        assert!(host.written_text().ends_with("SMITH\r\n"));

        let missing = fill_form(&mut session, &mut screen, &[("Policy", "123")]).await;
        assert!(matches!(missing, Err(SessionError::FieldNotFound(_))));
    }
}
