/// A notification as handed to the display surface. Showing a notification
/// with a tag replaces any earlier notification carrying the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub tag: Option<String>,
}

pub trait NotificationDisplay: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn show<'a>(&'a self, notification: &'a RenderedNotification) -> Self::Fut<'a>;
}

/// Window/client control available to the receiving agent. `navigate` may be
/// refused by environments that forbid direct navigation from the agent; the
/// receiver then falls back to `focus` plus `post_navigate`.
pub trait ContextRouter: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn open_contexts(&self) -> Vec<String>;
    fn navigate<'a>(&'a self, context: &'a str, url: &'a str) -> Self::Fut<'a>;
    fn focus<'a>(&'a self, context: &'a str) -> Self::Fut<'a>;
    fn post_navigate<'a>(&'a self, context: &'a str, url: &'a str) -> Self::Fut<'a>;
    fn open<'a>(&'a self, url: &'a str) -> Self::Fut<'a>;
}
