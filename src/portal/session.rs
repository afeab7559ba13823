//! The billing portal, as seen by the import.
//!
//! [`BillingPortal`] is the seam between the import flow and the browser;
//! [`ClickeduPortal`] drives a real browser through WebDriver.

use super::webdriver::{ElementId, WebDriverClient, WebDriverError};
use crate::config::PortalConfig;
use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Polling interval while waiting for a checkbox to become clickable.
const CLICKABLE_POLL_MILLIS: u64 = 500;

/// A page element carrying a `tooltip` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalField {
    pub tooltip: String,
    pub handle: ElementId,
}

/// Operations the import needs from the portal.
#[allow(async_fn_in_trait)]
pub trait BillingPortal {
    /// Start the browser on the login page.
    async fn open(&mut self) -> Result<()>;

    /// Wait until the user has logged in and opened the billing page.
    async fn wait_for_billing_page(&mut self) -> Result<()>;

    /// Every tooltip-carrying element of the billing table.
    async fn billing_fields(&mut self) -> Result<Vec<PortalField>>;

    /// Enable the field and type `value` into it.
    async fn fill_field(&mut self, field: &ElementId, value: &str) -> Result<()>;

    /// Wait for the user to save. Returns `false` on timeout.
    async fn wait_for_save(&mut self) -> Result<bool>;

    async fn close(&mut self) -> Result<()>;
}

/// Clickedu billing page driven through a WebDriver server.
pub struct ClickeduPortal {
    config: PortalConfig,
    client: Option<WebDriverClient>,
}

impl ClickeduPortal {
    pub fn new(config: PortalConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    fn client(&self) -> Result<&WebDriverClient> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow!("Browser session is not open"))
    }

    fn title_selector(&self) -> String {
        format!(".{}", self.config.page_title_class)
    }

    fn table_selector(&self) -> String {
        format!("#{}", self.config.table_id)
    }

    async fn on_billing_page(&self, client: &WebDriverClient) -> Result<bool, WebDriverError> {
        let titles = client.find_elements(&self.title_selector()).await?;
        if titles.len() != 1 {
            return Ok(false);
        }
        if client.text(&titles[0]).await?.trim() != self.config.page_title {
            return Ok(false);
        }
        let tables = client.find_elements(&self.table_selector()).await?;
        Ok(tables.len() == 1)
    }

    async fn table_hidden(&self, client: &WebDriverClient) -> Result<bool, WebDriverError> {
        let tables = client.find_elements(&self.table_selector()).await?;
        match tables.first() {
            None => Ok(true),
            Some(table) => Ok(!client.is_displayed(table).await?),
        }
    }

    async fn wait_clickable(&self, client: &WebDriverClient, element: &ElementId) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(self.config.field_timeout_seconds);
        loop {
            if client.is_displayed(element).await? && client.is_enabled(element).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "Checkbox not clickable after {}s",
                    self.config.field_timeout_seconds
                );
            }
            sleep(Duration::from_millis(CLICKABLE_POLL_MILLIS)).await;
        }
    }
}

/// First `input` of the given type inside a field.
async fn find_input(
    client: &WebDriverClient,
    field: &ElementId,
    input_type: &str,
) -> Result<Option<ElementId>, WebDriverError> {
    for input in client.find_elements_from(field, "input").await? {
        if client.attribute(&input, "type").await?.as_deref() == Some(input_type) {
            return Ok(Some(input));
        }
    }
    Ok(None)
}

impl BillingPortal for ClickeduPortal {
    async fn open(&mut self) -> Result<()> {
        let client = WebDriverClient::new_session(&self.config.webdriver_url)
            .await
            .context(
                "Could not start the browser. Check that the WebDriver server is running \
                 and that its version matches the installed Chrome",
            )?;
        // Kept before navigating so that `close` can end the session.
        let client = self.client.insert(client);
        client
            .navigate(&self.config.login_url)
            .await
            .with_context(|| format!("Failed to open {}", self.config.login_url))?;
        info!("Browser opened on {}", self.config.login_url);
        Ok(())
    }

    async fn wait_for_billing_page(&mut self) -> Result<()> {
        let client = self.client()?;
        let deadline = Instant::now() + Duration::from_secs(self.config.page_timeout_seconds);
        let poll = Duration::from_secs(self.config.poll_seconds);

        loop {
            match self.on_billing_page(client).await {
                Ok(true) => {
                    info!("Billing page detected");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!("Ignoring while waiting for page: {}", e),
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                bail!(
                    "The billing page '{}' did not show up within {}s. Try again",
                    self.config.page_title,
                    self.config.page_timeout_seconds
                );
            }
            sleep(poll).await;
        }
    }

    async fn billing_fields(&mut self) -> Result<Vec<PortalField>> {
        let client = self.client()?;
        let table = client
            .find_elements(&self.table_selector())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Billing table '{}' not found", self.config.table_id))?;

        let mut fields = Vec::new();
        for div in client.find_elements_from(&table, "div").await? {
            if let Some(tooltip) = client.attribute(&div, "tooltip").await? {
                fields.push(PortalField {
                    tooltip,
                    handle: div,
                });
            }
        }

        debug!("Found {} elements with a tooltip", fields.len());
        Ok(fields)
    }

    async fn fill_field(&mut self, field: &ElementId, value: &str) -> Result<()> {
        let client = self.client()?;

        let checkbox = find_input(client, field, "checkbox")
            .await?
            .ok_or_else(|| anyhow!("Field has no checkbox"))?;
        self.wait_clickable(client, &checkbox).await?;

        // The text input only accepts a value once the checkbox is ticked.
        if !client.is_selected(&checkbox).await? {
            sleep(Duration::from_millis(self.config.click_pause_millis)).await;
            client.click(&checkbox).await?;
        }

        let input = find_input(client, field, "text")
            .await?
            .ok_or_else(|| anyhow!("Field has no text input"))?;
        client.clear(&input).await?;
        client.send_keys(&input, value).await?;
        Ok(())
    }

    async fn wait_for_save(&mut self) -> Result<bool> {
        let client = self.client()?;
        let deadline = Instant::now() + Duration::from_secs(self.config.save_timeout_seconds);
        let poll = Duration::from_secs(self.config.poll_seconds);

        loop {
            match self.table_hidden(client).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!("Ignoring while waiting for save: {}", e),
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(poll).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.delete_session().await?;
        }
        Ok(())
    }
}
