//! Route table, route guards and overlay presentation.
//!
//! A detail opened from a list carries the list's location as `background`;
//! the detail then renders as an overlay above that page. Closing the overlay
//! is a backward navigation so history matches a direct visit by URL.

use std::sync::{Mutex, PoisonError};

use shared::domain::{IngredientId, OrderNumber};
use tracing::debug;

use crate::session::SessionSnapshot;

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const FORGOT_PASSWORD_PATH: &str = "/forgot-password";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavState {
    /// Page to keep rendered beneath an overlay detail.
    pub background: Option<Box<Location>>,
    /// Where a redirect to the login view originated.
    pub from: Option<Box<Location>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    pub state: NavState,
}

impl Location {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            state: NavState::default(),
        }
    }

    pub fn with_background(mut self, background: Location) -> Self {
        self.state.background = Some(Box::new(background));
        self
    }

    pub fn with_from(mut self, from: Location) -> Self {
        self.state.from = Some(Box::new(from));
        self
    }

    pub fn route(&self) -> Route {
        Route::parse(&self.pathname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    AuthenticatedOnly,
    UnauthenticatedOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Constructor,
    Feed,
    FeedOrder(OrderNumber),
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    Profile,
    ProfileOrders,
    ProfileOrder(OrderNumber),
    Ingredient(IngredientId),
    NotFound,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Self::Constructor,
            ["feed"] => Self::Feed,
            ["feed", number] => parse_number(number).map_or(Self::NotFound, Self::FeedOrder),
            ["login"] => Self::Login,
            ["register"] => Self::Register,
            ["forgot-password"] => Self::ForgotPassword,
            ["reset-password"] => Self::ResetPassword,
            ["profile"] => Self::Profile,
            ["profile", "orders"] => Self::ProfileOrders,
            ["profile", "orders", number] => {
                parse_number(number).map_or(Self::NotFound, Self::ProfileOrder)
            }
            ["ingredients", id] => Self::Ingredient(IngredientId::new(*id)),
            _ => Self::NotFound,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Constructor => HOME_PATH.to_string(),
            Self::Feed => "/feed".to_string(),
            Self::FeedOrder(number) => format!("/feed/{number}"),
            Self::Login => LOGIN_PATH.to_string(),
            Self::Register => "/register".to_string(),
            Self::ForgotPassword => FORGOT_PASSWORD_PATH.to_string(),
            Self::ResetPassword => "/reset-password".to_string(),
            Self::Profile => "/profile".to_string(),
            Self::ProfileOrders => "/profile/orders".to_string(),
            Self::ProfileOrder(number) => format!("/profile/orders/{number}"),
            Self::Ingredient(id) => format!("/ingredients/{id}"),
            Self::NotFound => "/404".to_string(),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Login | Self::Register | Self::ForgotPassword | Self::ResetPassword => {
                Access::UnauthenticatedOnly
            }
            Self::Profile | Self::ProfileOrders | Self::ProfileOrder(_) => {
                Access::AuthenticatedOnly
            }
            _ => Access::Public,
        }
    }

    /// Detail routes that may render above a background page.
    pub fn is_detail(&self) -> bool {
        matches!(
            self,
            Self::FeedOrder(_) | Self::ProfileOrder(_) | Self::Ingredient(_)
        )
    }
}

fn parse_number(raw: &str) -> Option<OrderNumber> {
    raw.parse::<u64>().ok().map(OrderNumber)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not resolved yet; render a neutral placeholder.
    Pending,
    Allow,
    Redirect { to: Location, replace: bool },
}

pub fn guard(route: &Route, session: &SessionSnapshot, location: &Location) -> GuardDecision {
    let access = route.access();
    if access == Access::Public {
        return GuardDecision::Allow;
    }
    if !session.is_auth_checked {
        return GuardDecision::Pending;
    }

    match access {
        Access::UnauthenticatedOnly if session.is_authenticated => {
            let to = location
                .state
                .from
                .as_deref()
                .cloned()
                .unwrap_or_else(|| Location::new(HOME_PATH));
            GuardDecision::Redirect { to, replace: true }
        }
        Access::AuthenticatedOnly if !session.is_authenticated => GuardDecision::Redirect {
            to: login_redirect(location),
            replace: true,
        },
        _ if *route == Route::ResetPassword && !session.reset_requested => {
            GuardDecision::Redirect {
                to: Location::new(FORGOT_PASSWORD_PATH),
                replace: true,
            }
        }
        _ => GuardDecision::Allow,
    }
}

/// The login location remembering where the user was headed.
pub fn login_redirect(origin: &Location) -> Location {
    Location::new(LOGIN_PATH).with_from(origin.clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPlan {
    /// Location rendered as the page.
    pub page: Location,
    /// Detail rendered above the page, if any.
    pub overlay: Option<Route>,
}

pub fn plan(location: &Location) -> ViewPlan {
    if let Some(background) = location.state.background.as_deref() {
        let route = location.route();
        if route.is_detail() {
            return ViewPlan {
                page: background.clone(),
                overlay: Some(route),
            };
        }
    }
    ViewPlan {
        page: location.clone(),
        overlay: None,
    }
}

pub trait Navigator: Send + Sync {
    fn current(&self) -> Location;
    fn navigate(&self, to: Location, replace: bool);
    fn back(&self);
}

/// Opens a detail above the current page.
pub fn open_detail(navigator: &dyn Navigator, route: &Route) {
    let current = navigator.current();
    navigator.navigate(Location::new(route.path()).with_background(current), false);
}

pub fn close_overlay(navigator: &dyn Navigator) {
    navigator.back();
}

/// Applies a guard decision. Returns whether the current view may render.
pub fn apply(navigator: &dyn Navigator, decision: GuardDecision) -> bool {
    match decision {
        GuardDecision::Allow => true,
        GuardDecision::Pending => false,
        GuardDecision::Redirect { to, replace } => {
            debug!(to = %to.pathname, "routing: redirect");
            navigator.navigate(to, replace);
            false
        }
    }
}

struct History {
    entries: Vec<Location>,
    index: usize,
}

/// Navigator over an in-process history stack.
pub struct MemoryNavigator {
    history: Mutex<History>,
}

impl MemoryNavigator {
    pub fn new(initial: Location) -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![initial],
                index: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Navigator for MemoryNavigator {
    fn current(&self) -> Location {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.entries[history.index].clone()
    }

    fn navigate(&self, to: Location, replace: bool) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if replace {
            let index = history.index;
            history.entries[index] = to;
        } else {
            let next = history.index + 1;
            history.entries.truncate(next);
            history.entries.push(to);
            history.index = next;
        }
    }

    fn back(&self) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.index = history.index.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "tests/routing_tests.rs"]
mod tests;
