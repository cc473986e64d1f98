/// SettingsReader defines the port for reading runtime settings by name
pub trait SettingsReader: Send + Sync + 'static {
    fn get_string(&self, name: &str, default: Option<&str>) -> Option<String>;

    fn get_long(&self, name: &str, default: i64) -> i64;

    fn get_boolean(&self, name: &str, default: bool) -> bool;
}
