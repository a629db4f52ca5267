//! 核心宏定义
//!
//! 配置结构体大多只有一组固定的默认值，用宏减少样板代码。

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```ignore
/// struct WindowConfig {
///     width: u32,
///     title: String,
/// }
///
/// impl_default!(WindowConfig {
///     width: 1280,
///     title: "Cloth".to_string(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
