use leptos::prelude::*;
use leptos_ui::clx;
use tw_merge::*;

mod components {
    use super::*;
    clx! {AlertTitle, h4, "mb-1 font-medium tracking-tight leading-none"}
    clx! {AlertDescription, p, "text-sm [&_p]:leading-relaxed"}
}

pub use components::*;

#[component]
pub fn Alert(
    #[prop(into, optional)] tone: Signal<AlertTone>,
    #[prop(into, optional)] class: String,
    children: Children,
) -> impl IntoView {
    let merged_class = move || {
        let alert = AlertClass { tone: tone.get() };
        alert.with_class(class.clone())
    };

    view! {
        <div data-name="Alert" role="alert" class=merged_class>
            {children()}
        </div>
    }
}

/* ========================================================== */
/*                       🧬 STRUCT 🧬                         */
/* ========================================================== */

#[derive(TwClass, Default)]
#[tw(class = "relative w-full rounded-lg border px-4 py-3 text-sm")]
pub struct AlertClass {
    tone: AlertTone,
}

#[derive(TwVariant)]
pub enum AlertTone {
    #[tw(default, class = "bg-card text-card-foreground")]
    Default,
    #[tw(class = "border-destructive/30 text-destructive")]
    Destructive,
    #[tw(class = "border-emerald-500/30 text-emerald-700 dark:text-emerald-400")]
    Success,
}
