//! 以 `prost-types` 手工构造 `probe.v1.Echo` 的描述符集，并写入临时目录。

#![allow(dead_code)]

use std::path::PathBuf;

use prost::Message;
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};

pub const FILE_NAME: &str = "echo.pb";

fn field(name: &str, number: i32, kind: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(kind as i32),
        json_name: Some(name.to_owned()),
        ..Default::default()
    }
}

fn method(name: &str, client_streaming: bool, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_owned()),
        input_type: Some(".probe.v1.EchoRequest".to_owned()),
        output_type: Some(".probe.v1.EchoReply".to_owned()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

pub fn echo_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("probe/v1/echo.proto".to_owned()),
            package: Some("probe.v1".to_owned()),
            message_type: vec![
                DescriptorProto {
                    name: Some("EchoRequest".to_owned()),
                    field: vec![field("text", 1, Type::String), field("count", 2, Type::Int32)],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("EchoReply".to_owned()),
                    field: vec![field("text", 1, Type::String)],
                    ..Default::default()
                },
            ],
            service: vec![ServiceDescriptorProto {
                name: Some("Echo".to_owned()),
                method: vec![
                    method("Say", false, false),
                    method("Watch", false, true),
                    method("Upload", true, false),
                    method("Chat", true, true),
                ],
                ..Default::default()
            }],
            syntax: Some("proto3".to_owned()),
            ..Default::default()
        }],
    }
}

/// 在独立的临时目录下写出 `echo.pb`，返回该目录。
pub fn write_echo_set(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "spark-transport-grpc-{}-{tag}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("应能创建临时目录");
    std::fs::write(dir.join(FILE_NAME), echo_descriptor_set().encode_to_vec())
        .expect("应能写出描述符集");
    dir
}
