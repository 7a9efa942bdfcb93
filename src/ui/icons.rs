pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const DATABASE: &str = "🗄️";
    pub const PACKAGE: &str = "📦";
    pub const CAR: &str = "🚗";
    pub const FUEL: &str = "⛽";
    pub const WRENCH: &str = "🔧";
    pub const GEAR: &str = "⚙️";
    pub const DEL: &str = "🗑️";
}
