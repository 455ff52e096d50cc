use crate::actions::EntityActions;
use crate::components::ui::{Alert, AlertDescription, AlertTitle, AlertTone};
use crate::config::EnvConfig;
use crate::pages::{AppLayout, EntityPage, HomePage};
use crate::state::{AppConfig, AppContext, AppState};
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;

#[component]
pub fn App() -> impl IntoView {
    // The field tables are checked once at boot; a broken table is a build bug,
    // so nothing is wired up and the page says so.
    let config = match AppConfig::builtin() {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid field table: {e}");
            return view! {
                <Alert tone=AlertTone::Destructive class="m-6 max-w-lg">
                    <AlertTitle>"Dashboard unavailable"</AlertTitle>
                    <AlertDescription>{e.to_string()}</AlertDescription>
                </Alert>
            }
            .into_any();
        }
    };

    let app = AppContext(AppState::new(EnvConfig::new(), config));
    provide_context(EntityActions::new(app.clone()));
    provide_context(app);

    view! {
        <Router>
            <AppLayout>
                <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                    <Route path=path!(":module/:subtype") view=EntityPage />
                    <Route path=path!("") view=HomePage />
                </Routes>
            </AppLayout>
        </Router>
    }
    .into_any()
}
