use proc_macro::TokenStream;

mod component;

/// Derive macro generating a `trellis::Component` class descriptor
///
/// # Example
/// ```ignore
/// use trellis::{Component, Setting, Wired};
///
/// #[derive(Component)]
/// #[component(name = "users", start = "connect", lazy = false)]
/// pub struct UserService {
///     #[autowire]
///     repository: Wired<UserRepository>,
///     #[autowire = "#users.page_size"]
///     page_size: Setting<u32>,
/// }
///
/// impl UserService {
///     async fn connect(&self) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_derive(Component, attributes(component, autowire))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    component::derive_component(input)
}
