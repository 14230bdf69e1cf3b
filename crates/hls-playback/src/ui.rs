use crate::errors::Result;

/// Prompt and notification surface of the host UI.
#[async_trait::async_trait]
pub trait UiPrompt: Send + Sync {
    /// Let the user pick one of `items`; `None` means dismissed.
    async fn show_choice(&self, title: &str, items: &[String]) -> Result<Option<usize>>;
    /// Ask for free text; `None` means dismissed.
    async fn show_text_input(&self, title: &str) -> Result<Option<String>>;
    fn notify(&self, message: &str);
    fn loading_start(&self);
    fn loading_stop(&self);
}

/// Keeps the loading indicator up for as long as it lives.
pub struct LoadingGuard<'a> {
    ui: &'a dyn UiPrompt,
}

impl<'a> LoadingGuard<'a> {
    pub fn new(ui: &'a dyn UiPrompt) -> Self {
        ui.loading_start();
        Self { ui }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.ui.loading_stop();
    }
}
