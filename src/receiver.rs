use crate::ports::receiver::RenderedNotification;
use crate::ports::{ContextRouter, NotificationDisplay};
use crate::types::push::{PayloadData, PushPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    InvalidPayload,
}

impl std::fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiveError::InvalidPayload => f.write_str("push payload is not valid JSON"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    NavigatedInPlace,
    FocusedAndMessaged,
    OpenedNew,
}

/// The always-running receiving agent: turns a delivered payload into a
/// visible notification and routes clicks back into the application.
pub struct PushReceiver<D, C> {
    display: D,
    router: C,
}

impl<D, C> PushReceiver<D, C>
where
    D: NotificationDisplay,
    C: ContextRouter,
{
    pub fn new(display: D, router: C) -> Self {
        Self { display, router }
    }

    /// Parses the wire payload and renders it. The tag carries through so
    /// repeated notifications for the same discussion replace each other
    /// instead of piling up.
    pub async fn on_push(&self, raw: &str) -> Result<PushPayload, ReceiveError> {
        let payload: PushPayload =
            serde_json::from_str(raw).map_err(|_| ReceiveError::InvalidPayload)?;
        self.display
            .show(&RenderedNotification {
                title: payload.title.clone(),
                body: payload.body.clone(),
                icon: payload.icon.clone(),
                tag: payload.tag.clone(),
            })
            .await;
        Ok(payload)
    }

    /// Click routing: reuse an open application context when one exists,
    /// otherwise open a new one at the resolved target.
    pub async fn on_click(&self, data: Option<&PayloadData>) -> Result<ClickAction, C::Error> {
        let url = data.map(PayloadData::url).unwrap_or("/");
        let contexts = self.router.open_contexts();
        match contexts.first() {
            Some(context) => match self.router.navigate(context, url).await {
                Ok(()) => Ok(ClickAction::NavigatedInPlace),
                Err(err) => {
                    eprintln!(
                        "push click: direct navigation unavailable ({err}); focusing instead"
                    );
                    self.router.focus(context).await?;
                    self.router.post_navigate(context, url).await?;
                    Ok(ClickAction::FocusedAndMessaged)
                }
            },
            None => {
                self.router.open(url).await?;
                Ok(ClickAction::OpenedNew)
            }
        }
    }
}
