/// 后台服务的公共标识，日志里用 `name()` 区分来源
pub trait Service {
    fn name(&self) -> &'static str;
}
