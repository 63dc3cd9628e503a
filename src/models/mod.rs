//! 协议数据模型

pub mod openai;
